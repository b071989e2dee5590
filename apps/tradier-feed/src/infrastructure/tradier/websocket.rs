//! WebSocket stream connector backed by `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{InboundFrame, StreamConnection, StreamConnector, TransportError};

/// Dials market event streams.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl WebSocketConnector {
    /// Create a connector with a dial timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, TransportError> {
        tracing::debug!(url, "Connecting to stream");

        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(map_ws_error)?;

        Ok(Box::new(TungsteniteConnection { ws }))
    }
}

/// An open WebSocket connection.
pub struct TungsteniteConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for TungsteniteConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(map_ws_error)
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.ws
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(map_ws_error)
    }

    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            let frame = match self.ws.next().await? {
                Ok(Message::Text(text)) => InboundFrame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => InboundFrame::Binary(bytes.to_vec()),
                Ok(Message::Pong(_)) => InboundFrame::Pong,
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Close frame received");
                    InboundFrame::Close
                }
                // Pings are answered by tungstenite on the next read or write.
                Ok(Message::Ping(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(map_ws_error(e))),
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

impl std::fmt::Debug for TungsteniteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteConnection").finish_non_exhaustive()
    }
}

/// Classify a tungstenite error.
fn map_ws_error(error: WsError) -> TransportError {
    use std::io::ErrorKind;
    use tokio_tungstenite::tungstenite::error::ProtocolError;

    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TransportError::Closed,
        WsError::Io(e) => match e.kind() {
            ErrorKind::TimedOut => TransportError::Timeout,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Other(e.to_string()),
        },
        e @ (WsError::Capacity(_) | WsError::Utf8 { .. } | WsError::Protocol(_)) => {
            TransportError::Payload(e.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}

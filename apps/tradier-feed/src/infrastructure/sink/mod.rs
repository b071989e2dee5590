//! JSON Lines Output
//!
//! Appends one record per line to a file or stdout. Serves as both the
//! dispatcher's response sink and the streaming client's window sink.
//!
//! - History results become `{"url": .., "data": ..}` or
//!   `{"url": .., "error": .., "status": ..}`
//! - Each streamed message is written verbatim on its own line

use std::fs::OpenOptions;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{FetchError, ResponseSink, WindowSink};
use crate::domain::history::RequestDescriptor;

/// Sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The output file could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// Output path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A record could not be written.
    #[error("failed to write record: {0}")]
    Write(#[from] io::Error),

    /// A record could not be serialized.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(untagged)]
enum HistoryRecord<'a> {
    Data {
        url: &'a str,
        data: Value,
    },
    Error {
        url: &'a str,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

/// Line-oriented JSON writer.
pub struct JsonLinesSink {
    writer: LineWriter<Box<dyn Write + Send>>,
    lines: u64,
}

impl JsonLinesSink {
    /// Append to `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), "Writing output");
        Ok(Self::from_writer(file))
    }

    /// Write to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Write to an arbitrary writer.
    #[must_use]
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: LineWriter::new(Box::new(writer)),
            lines: 0,
        }
    }

    /// Lines written so far.
    #[must_use]
    pub const fn lines(&self) -> u64 {
        self.lines
    }

    /// Write one line; a trailing newline is added.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    /// Serialize a value as one line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        self.write_line(&line)
    }

    /// Flush buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl ResponseSink for JsonLinesSink {
    fn accept(&mut self, descriptor: &RequestDescriptor, result: Result<Value, FetchError>) {
        let url = descriptor.url();
        let record = match result {
            Ok(data) => HistoryRecord::Data { url, data },
            Err(e) => HistoryRecord::Error {
                url,
                status: e.status(),
                error: e.to_string(),
            },
        };

        if let Err(e) = self.write_record(&record) {
            tracing::error!(url, error = %e, "Failed to write history record");
        }
    }
}

impl WindowSink for JsonLinesSink {
    fn deliver(&mut self, window: Vec<String>) {
        for message in &window {
            if let Err(e) = self.write_line(message.trim_end()) {
                tracing::error!(error = %e, "Failed to write stream message");
                return;
            }
        }
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

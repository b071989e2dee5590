//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Dispatcher`: rate-limited, sequential history request pipeline
//! - `StreamingClient`: windowed streaming session lifecycle
//! - `HeartbeatMonitor`: liveness reporting for a connected session

pub mod dispatcher;
pub mod heartbeat;
pub mod streaming;

pub use dispatcher::{Dispatcher, DrainSummary};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use streaming::{
    DEFAULT_STREAM_URL, KeepaliveConfig, StreamError, StreamSettings, StreamingClient,
};

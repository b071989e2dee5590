//! Domain Layer - Core market data types.
//!
//! This layer contains the request, subscription and session types shared
//! by the history pipeline and the streaming session. All types here are
//! pure Rust with serialization support.

/// Historical data request descriptors and intervals.
pub mod history;

/// Streaming session state, message windows and shutdown reasons.
pub mod streaming;

/// Streaming subscription descriptor and its wire payload.
pub mod subscription;

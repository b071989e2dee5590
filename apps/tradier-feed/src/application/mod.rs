//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the history dispatcher and the streaming session
//! state machine, written against the port interfaces so that transports
//! can be swapped for scripted ones in tests.

/// Port interfaces for external systems (HTTP, WebSocket, sinks).
pub mod ports;

/// Dispatcher, streaming client and heartbeat services.
pub mod services;

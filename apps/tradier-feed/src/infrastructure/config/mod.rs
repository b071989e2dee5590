//! Configuration Module
//!
//! Configuration loading for the feed binary.

mod settings;

pub use settings::{
    ConfigError, Credentials, FeedConfig, FeedMode, HttpSettings, parse_stoptime,
};

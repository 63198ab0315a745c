//! Service Configuration
//!
//! Environment-driven settings for the ingest server, the tick-log
//! publisher, and the validation engine.

mod settings;

pub use settings::{ConfigError, IngestConfig, LogSettings, ServerSettings, ValidationSettings};

//! Infrastructure layer - Adapters and external integrations.

/// Environment-driven configuration.
pub mod config;

/// Metric names and recording helpers.
pub mod metrics;

/// The tick-log publisher.
pub mod publish;

/// TCP connection manager and line framer.
pub mod server;

/// Tracing subscriber setup.
pub mod telemetry;

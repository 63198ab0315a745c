#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::default_trait_access
    )
)]

//! Tick Ingest - Price Update Ingestion Service
//!
//! Accepts continuous streams of price updates ("ticks") over persistent
//! TCP connections, validates and enriches each update, and republishes it
//! into the downstream durable tick log for consumers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules, no I/O
//!   - `tick`: raw/enriched record types, connection and sequence identifiers
//!   - `validation`: the stateful per-instrument validation engine
//!   - `enrichment`: arrival metadata stamping and sequencing
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: the publisher interface the pipeline writes to
//!   - `services`: the per-record ingest pipeline
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `server`: TCP connection manager and line framer
//!   - `publish`: the tick-log publisher with retry and backoff
//!   - `config`: environment-driven configuration
//!   - `metrics`: metric names and recording helpers
//!   - `telemetry`: tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! producers ──TCP──► Connection ──► Validation ──► Enrichment ──► Publish ──► tick log
//!                     Manager        Engine         & Sequencer    Pipeline
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure tick types and validation/enrichment logic.
pub mod domain;

/// Application layer - The ingest pipeline and its ports.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::enrichment::{Enricher, Sequencer};
pub use domain::tick::{ConnectionId, EnrichedTick, RawRecord, SequenceId, ValidationOutcome};
pub use domain::validation::{
    LastPriceStore, ValidationConfig, ValidationEngine, ValidationFailure, ValidationMode,
    ValidationVerdict,
};

// Application
pub use application::ports::{PublishError, TickPublisher};
pub use application::services::{IngestPipeline, ProcessOutcome};

// Infrastructure
pub use infrastructure::config::{ConfigError, IngestConfig, LogSettings, ServerSettings, ValidationSettings};
pub use infrastructure::publish::{AckLevel, LogConfig, LogPublisher, TickLogTransport, TransportError};
pub use infrastructure::server::{ConnectionStats, IngestServer, LineFramer, ServerConfig, ServerError};
pub use infrastructure::telemetry;

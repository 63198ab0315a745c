//! Ingest Pipeline
//!
//! Drives one raw record through decode → validate → enrich → publish.
//! Per-record failures (decode, validation, publish) are logged, counted
//! per reason, and isolated to the record; they never terminate the
//! connection or the process.

use std::sync::Arc;

use crate::application::ports::{PublishError, TickPublisher};
use crate::domain::enrichment::Enricher;
use crate::domain::tick::{RawRecord, SequenceId, ValidationOutcome};
use crate::domain::validation::{ValidationEngine, ValidationFailure, ValidationVerdict};
use crate::infrastructure::metrics;

/// What happened to one record.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The record was validated, enriched, and delivered.
    Published {
        /// Sequence identifier assigned to the record.
        sequence: SequenceId,
    },
    /// The record was rejected by validation (including decode failures).
    Rejected {
        /// Everything that failed, in check order.
        failures: Vec<ValidationFailure>,
    },
    /// The record validated but could not be delivered.
    PublishFailed {
        /// The terminal publish error.
        error: PublishError,
    },
}

/// The per-record processing pipeline shared by all connection tasks.
pub struct IngestPipeline {
    engine: ValidationEngine,
    enricher: Enricher,
    publisher: Arc<dyn TickPublisher>,
}

impl IngestPipeline {
    /// Assemble a pipeline.
    #[must_use]
    pub fn new(
        engine: ValidationEngine,
        enricher: Enricher,
        publisher: Arc<dyn TickPublisher>,
    ) -> Self {
        Self {
            engine,
            enricher,
            publisher,
        }
    }

    /// The pipeline's validation engine, for observation.
    #[must_use]
    pub const fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Process one raw record end to end.
    pub async fn process(&self, raw: RawRecord) -> ProcessOutcome {
        metrics::record_received();

        let (tick, warnings) = match self.engine.validate(&raw.line) {
            ValidationVerdict::Accepted { tick, warnings } => (tick, warnings),
            ValidationVerdict::Rejected { failures } => {
                for failure in &failures {
                    metrics::record_rejection(failure.category());
                }
                tracing::debug!(
                    connection = %raw.connection_id,
                    reasons = ?failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "record rejected"
                );
                return ProcessOutcome::Rejected { failures };
            }
        };

        if !warnings.is_empty() {
            tracing::warn!(
                connection = %raw.connection_id,
                instrument = %tick.instrument,
                warnings = ?warnings,
                "record accepted with warnings"
            );
        }

        let outcome = ValidationOutcome::passed_with_warnings(warnings);
        let enriched = self.enricher.enrich(tick, &raw, outcome);
        metrics::record_latency(enriched.latency_ms);

        match self.publisher.publish(&enriched).await {
            Ok(()) => {
                metrics::record_published();
                ProcessOutcome::Published {
                    sequence: enriched.sequence,
                }
            }
            Err(error) => {
                metrics::record_publish_failure();
                tracing::error!(
                    connection = %raw.connection_id,
                    instrument = %enriched.tick.instrument,
                    sequence = %enriched.sequence,
                    error = %error,
                    "publish failed, record lost"
                );
                ProcessOutcome::PublishFailed { error }
            }
        }
    }
}

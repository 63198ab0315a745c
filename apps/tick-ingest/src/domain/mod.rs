//! Domain layer - Pure types and rules, no I/O.

/// Arrival metadata stamping and sequence identifier generation.
pub mod enrichment;

/// Raw and enriched record types plus identifiers.
pub mod tick;

/// The stateful per-instrument validation engine.
pub mod validation;

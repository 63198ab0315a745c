//! Tracing Setup
//!
//! Initializes the tracing subscriber with an environment filter and a
//! plain fmt layer. Trace export belongs to the external observability
//! stack; this service only emits.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: `tick_ingest=info`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default directive applied when `RUST_LOG` does not mention this crate.
const DEFAULT_DIRECTIVE: &str = "tick_ingest=info";

/// Initialize the tracing subscriber.
///
/// Safe to call more than once; only the first call installs a subscriber.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_DIRECTIVE
            .parse()
            .expect("static directive 'tick_ingest=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

//! Publish Pipeline
//!
//! Delivers enriched ticks to the downstream durable tick log, keyed by
//! instrument code. All publishes flow through one dedicated writer task
//! fed by a bounded channel, so delivery order matches publish-call order,
//! in particular per partition key. Transient failures retry with jittered
//! exponential backoff and a fresh connection per attempt; permanent
//! failures (serialization) surface immediately; once the retry budget is
//! exhausted the error goes back to the caller rather than being silently
//! dropped or retried forever.

mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use feed_wire::{BackoffConfig, BackoffPolicy};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use transport::{AckLevel, TickLogTransport, TransportError};

use crate::application::ports::{PublishError, TickPublisher};
use crate::domain::tick::EnrichedTick;
use crate::infrastructure::config::LogSettings;
use crate::infrastructure::metrics;

/// Partition key of the synthetic connectivity probe.
const PROBE_KEY: &str = "__connectivity__";

/// Configuration for the publisher.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Broker addresses, tried in order.
    pub brokers: Vec<String>,
    /// Topic the enriched ticks are published under.
    pub topic: String,
    /// Acknowledgment level requested from the broker.
    pub acks: AckLevel,
    /// Retry ceiling per record, beyond the first attempt.
    pub max_retries: u32,
    /// Bound on one delivery attempt.
    pub request_timeout: Duration,
    /// Initial delay between delivery attempts.
    pub retry_delay_initial: Duration,
    /// Ceiling on the delay between delivery attempts.
    pub retry_delay_max: Duration,
    /// Grace period for in-flight records at shutdown.
    pub shutdown_grace: Duration,
    /// Capacity of the publish intake channel.
    pub channel_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(LogSettings::default())
    }
}

impl From<LogSettings> for LogConfig {
    fn from(settings: LogSettings) -> Self {
        Self {
            brokers: settings.brokers,
            topic: settings.topic,
            acks: settings.acks,
            max_retries: settings.max_retries,
            request_timeout: settings.request_timeout,
            retry_delay_initial: settings.retry_delay_initial,
            retry_delay_max: settings.retry_delay_max,
            shutdown_grace: settings.shutdown_grace,
            channel_capacity: settings.channel_capacity,
        }
    }
}

impl LogConfig {
    fn retry_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.retry_delay_initial,
            max_delay: self.retry_delay_max,
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: self.max_retries,
        }
    }
}

/// One record handed to the writer task.
struct PublishRequest {
    envelope: String,
    key: String,
    resp: oneshot::Sender<Result<(), PublishError>>,
}

/// The tick-log publisher.
///
/// Construct with [`connect`](Self::connect), which establishes the broker
/// connection and awaits a synthetic probe record before the pipeline is
/// considered ready.
pub struct LogPublisher {
    topic: String,
    acks: AckLevel,
    shutdown_grace: Duration,
    intake: Mutex<Option<mpsc::Sender<PublishRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
}

impl LogPublisher {
    /// Connect to the tick log and verify connectivity with an awaited
    /// probe record.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::RetriesExhausted`] once the initial connect
    /// budget is spent; callers treat this as a startup failure.
    pub async fn connect(config: LogConfig) -> Result<Self, PublishError> {
        let mut transport = TickLogTransport::new(config.brokers.clone(), config.acks);
        let mut backoff = BackoffPolicy::new(config.retry_backoff());

        loop {
            match Self::probe(&mut transport, &config).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "tick log connectivity probe failed");
                    if let Some(delay) = backoff.next_delay() {
                        tokio::time::sleep(delay).await;
                    } else {
                        return Err(PublishError::RetriesExhausted {
                            attempts: backoff.attempt_count() + 1,
                            last_error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(topic = %config.topic, acks = config.acks.as_str(), "tick log ready");

        let (intake_tx, intake_rx) = mpsc::channel(config.channel_capacity);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let worker = PublishWorker {
            transport,
            config: config.clone(),
            in_flight: Arc::clone(&in_flight),
        };
        let handle = tokio::spawn(worker.run(intake_rx));

        Ok(Self {
            topic: config.topic,
            acks: config.acks,
            shutdown_grace: config.shutdown_grace,
            intake: Mutex::new(Some(intake_tx)),
            worker: Mutex::new(Some(handle)),
            in_flight,
        })
    }

    async fn probe(
        transport: &mut TickLogTransport,
        config: &LogConfig,
    ) -> Result<(), PublishError> {
        if !transport.is_connected() {
            transport
                .connect()
                .await
                .map_err(|e| PublishError::Transport(e.to_string()))?;
        }

        let envelope = serde_json::json!({
            "topic": config.topic,
            "key": PROBE_KEY,
            "acks": config.acks.as_str(),
            "value": { "probe": true },
        })
        .to_string();

        match tokio::time::timeout(config.request_timeout, transport.send(&envelope)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PublishError::Transport(e.to_string())),
            Err(_) => {
                transport.disconnect();
                Err(PublishError::Timeout {
                    timeout: config.request_timeout,
                })
            }
        }
    }

    /// Records accepted but not yet delivered or failed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting publishes, wait the grace period for in-flight
    /// deliveries, then release the connection.
    ///
    /// Returns the number of records still unflushed when the grace period
    /// elapsed; those are reported lost, not retried.
    pub async fn shutdown(&self) -> usize {
        let Some(intake) = self.intake.lock().take() else {
            return 0;
        };
        drop(intake);

        let Some(handle) = self.worker.lock().take() else {
            return 0;
        };

        tracing::info!(
            grace_secs = self.shutdown_grace.as_secs(),
            in_flight = self.in_flight(),
            "publisher draining"
        );

        let abort = handle.abort_handle();
        match tokio::time::timeout(self.shutdown_grace, handle).await {
            Ok(_) => {
                tracing::info!("publisher drained");
                0
            }
            Err(_) => {
                abort.abort();
                let lost = self.in_flight();
                tracing::error!(lost, "shutdown grace elapsed, unflushed records lost");
                lost
            }
        }
    }
}

#[async_trait]
impl TickPublisher for LogPublisher {
    async fn publish(&self, tick: &EnrichedTick) -> Result<(), PublishError> {
        let started = Instant::now();

        // Serialization failures are permanent: surface immediately.
        let value = serde_json::to_value(tick)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        let envelope = serde_json::json!({
            "topic": self.topic,
            "key": tick.tick.instrument,
            "acks": self.acks.as_str(),
            "value": value,
        })
        .to_string();

        let Some(intake) = self.intake.lock().clone() else {
            return Err(PublishError::ShutDown);
        };

        let (resp_tx, resp_rx) = oneshot::channel();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let request = PublishRequest {
            envelope,
            key: tick.tick.instrument.clone(),
            resp: resp_tx,
        };
        if intake.send(request).await.is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(PublishError::ShutDown);
        }

        let result = resp_rx.await.unwrap_or(Err(PublishError::ShutDown));
        metrics::record_publish_duration(started.elapsed());
        result
    }
}

/// The dedicated writer task: owns the transport and serializes every
/// delivery, preserving publish-call order.
struct PublishWorker {
    transport: TickLogTransport,
    config: LogConfig,
    in_flight: Arc<AtomicUsize>,
}

impl PublishWorker {
    async fn run(mut self, mut intake: mpsc::Receiver<PublishRequest>) {
        while let Some(request) = intake.recv().await {
            let result = self.deliver(&request).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let _ = request.resp.send(result);
        }
        self.transport.close().await;
        tracing::debug!("publish worker stopped");
    }

    /// Deliver one record, retrying transient failures with backoff and a
    /// fresh connection per attempt.
    async fn deliver(&mut self, request: &PublishRequest) -> Result<(), PublishError> {
        let mut backoff = BackoffPolicy::new(self.config.retry_backoff());
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.attempt(&request.envelope).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        key = %request.key,
                        attempt = attempts,
                        error = %e,
                        "delivery attempt failed"
                    );
                    if let Some(delay) = backoff.next_delay() {
                        metrics::record_publish_retry();
                        tokio::time::sleep(delay).await;
                    } else {
                        return Err(PublishError::RetriesExhausted {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn attempt(&mut self, envelope: &str) -> Result<(), PublishError> {
        if !self.transport.is_connected() {
            self.transport
                .connect()
                .await
                .map_err(|e| PublishError::Transport(e.to_string()))?;
        }

        match tokio::time::timeout(self.config.request_timeout, self.transport.send(envelope))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PublishError::Transport(e.to_string())),
            Err(_) => {
                // The attempt may have died mid-write; start the next one
                // on a fresh connection.
                self.transport.disconnect();
                Err(PublishError::Timeout {
                    timeout: self.config.request_timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_config_mirrors_settings() {
        let settings = LogSettings::default();
        let config = LogConfig::from(settings.clone());
        assert_eq!(config.brokers, settings.brokers);
        assert_eq!(config.topic, settings.topic);
        assert_eq!(config.max_retries, settings.max_retries);
    }

    #[test]
    fn retry_backoff_caps_attempts_at_the_retry_ceiling() {
        let config = LogConfig {
            max_retries: 3,
            ..LogConfig::default()
        };
        let backoff = config.retry_backoff();
        assert_eq!(backoff.max_attempts, 3);
        assert_eq!(backoff.initial_delay, config.retry_delay_initial);
    }
}

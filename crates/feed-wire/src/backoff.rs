//! Backoff Policy
//!
//! Jittered exponential backoff shared by the transport client's reconnect
//! loop and the ingest service's publish retry loop. The policy owns the
//! attempt counter, so callers have one source of truth for "should we try
//! again and after how long".

use std::time::Duration;

use rand::Rng;

/// Configuration for backoff behavior.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry attempt.
    pub initial_delay: Duration,
    /// Ceiling on the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt (2.0 doubles the delay).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl BackoffConfig {
    /// Configuration with a fixed attempt cap and defaults otherwise.
    #[must_use]
    pub fn capped(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Stateful backoff policy.
///
/// `next_delay` returns the jittered delay to wait before the next attempt,
/// or `None` once the attempt cap is exhausted. `reset` restores the initial
/// delay after a success.
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    current_delay: Duration,
    attempts: u32,
}

impl BackoffPolicy {
    /// Create a policy from its configuration.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, or `None` if attempts are
    /// exhausted. Advances the attempt counter and the base delay.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempts += 1;
        let delay = self.jittered(self.current_delay);

        let grown = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = if grown.is_finite() && grown > 0.0 {
            Duration::from_secs_f64(grown.min(self.config.max_delay.as_secs_f64()))
        } else {
            self.config.max_delay
        };

        Some(delay)
    }

    /// Restore the initial state after a successful attempt.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return base;
        }

        let base_secs = base.as_secs_f64();
        let spread = base_secs * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((base_secs + jitter).max(0.001))
    }
}

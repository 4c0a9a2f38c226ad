//! Exponential backoff with jitter for probe retry loops.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Computes the delay between successive attempts of one probe.
///
/// Uses exponential backoff: delay = initial_delay * multiplier^attempt,
/// capped at the configured maximum, then jittered upward by up to 30% to
/// prevent probes created at the same instant from retrying in lockstep.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Creates a new backoff sequence starting at the initial delay.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Returns the delay to apply before the next attempt and advances the
    /// sequence.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt;
        self.attempt = self.attempt.saturating_add(1);

        let multiplier = self.config.multiplier.max(1.0).powi(exponent.min(i32::MAX as u32) as i32);
        let base_delay_ms = self.config.initial_delay_ms as f64 * multiplier;

        // Cap at max delay.
        let capped_delay_ms = base_delay_ms.min(self.config.max_delay_ms as f64);

        // Add jitter: random factor between 0 and 0.3.
        let jitter_factor = rand::thread_rng().gen_range(0.0..0.3);
        let jittered_delay_ms = capped_delay_ms * (1.0 + jitter_factor);

        Duration::from_millis(jittered_delay_ms as u64)
    }
}

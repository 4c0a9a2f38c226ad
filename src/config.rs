//! Configuration for wait calls.
//!
//! Durations are specified in milliseconds for serialization compatibility,
//! with `Duration` accessors for use in code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`RaceWaiter`] invocation.
///
/// Controls the two independent timeout scopes of a wait call and the backoff
/// applied between probe attempts. The global timeout bounds the entire call
/// and always wins when it fires first, regardless of individual probe states.
///
/// [`RaceWaiter`]: crate::waiter::RaceWaiter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WaitConfig {
    /// Maximum time a single probe may spend on its own retry loop.
    ///
    /// A probe that has neither reported ready nor returned a terminal error
    /// within this bound counts as failed.
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 30000ms (30 seconds)
    #[serde(default = "default_per_probe_timeout_ms")]
    pub per_probe_timeout_ms: u64,

    /// Maximum time the whole wait call may take.
    ///
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 60000ms (60 seconds)
    #[serde(default = "default_global_timeout_ms")]
    pub global_timeout_ms: u64,

    /// How long the coordinator waits for cancelled probes to acknowledge
    /// cancellation before aborting them.
    ///
    /// Cancellation is cooperative; a check that blocks its thread cannot be
    /// stopped and is reported via the outcome's cleanup flag instead.
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 3000ms (3 seconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Backoff applied between "not ready yet" attempts of a single probe.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_per_probe_timeout_ms() -> u64 {
    30000
}

fn default_global_timeout_ms() -> u64 {
    60000
}

fn default_grace_period_ms() -> u64 {
    3000
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            per_probe_timeout_ms: default_per_probe_timeout_ms(),
            global_timeout_ms: default_global_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl WaitConfig {
    /// Returns the per-probe timeout as a Duration.
    pub fn per_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.per_probe_timeout_ms)
    }

    /// Returns the global timeout as a Duration.
    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    /// Returns the cancellation grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Configuration for exponential backoff between probe attempts.
///
/// After each "not ready yet" attempt, the delay is multiplied by
/// `multiplier` and capped at `max_delay_ms`, then jittered upward by up to
/// 30% to prevent synchronized retries across probes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    ///
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 250ms
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the delay between attempts, before jitter.
    ///
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 5000ms (5 seconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt.
    ///
    /// Must be >= 1.0; smaller values are treated as 1.0.
    /// Default: 2.0
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl BackoffConfig {
    /// Returns the initial delay as a Duration.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Returns the maximum delay as a Duration.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_config_defaults_are_applied() {
        let config = WaitConfig::default();

        assert_eq!(config.per_probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.global_timeout(), Duration::from_secs(60));
        assert_eq!(config.grace_period(), Duration::from_secs(3));
        assert_eq!(config.backoff, BackoffConfig::default());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: WaitConfig = serde_json::from_str(r#"{"global_timeout_ms": 5000}"#)
            .expect("partial config should deserialize");

        assert_eq!(config.global_timeout_ms, 5000);
        assert_eq!(config.per_probe_timeout_ms, default_per_probe_timeout_ms());
        assert_eq!(config.backoff.initial_delay_ms, default_initial_delay_ms());
    }

    #[test]
    fn backoff_config_roundtrips_through_serde() {
        let config = BackoffConfig {
            initial_delay_ms: 10,
            max_delay_ms: 100,
            multiplier: 1.5,
        };

        let serialized = serde_json::to_string(&config).expect("config should serialize");
        let deserialized: BackoffConfig =
            serde_json::from_str(&serialized).expect("config should deserialize");

        assert_eq!(config, deserialized);
    }
}

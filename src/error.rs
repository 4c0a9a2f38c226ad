//! Error types for wait calls.
//!
//! A wait call has exactly three terminal error shapes, so callers can branch
//! deterministically: the input was invalid, every probe definitively failed,
//! or the global deadline elapsed first. Probe-level errors never abort the
//! call on their own; they are aggregated into [`RaceWaitError::AllProbesFailed`]
//! as one [`ProbeFailure`] record per probe.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Convenient result type for wait operations using [`RaceWaitError`] as the
/// error type.
pub type RaceWaitResult<T, I> = Result<T, RaceWaitError<I>>;

/// Errors returned by a wait call.
///
/// Distinguishes "definitively broken" ([`RaceWaitError::AllProbesFailed`])
/// from "too slow" ([`RaceWaitError::GlobalTimeout`]); callers that want to
/// retry a wait should only do so for the latter.
#[derive(Debug, Error)]
pub enum RaceWaitError<I: fmt::Debug> {
    /// The identifier list was empty or contained duplicates.
    ///
    /// Reported synchronously, before any probe is launched.
    #[error("invalid probe set: {reason}")]
    InvalidInput {
        /// Human-readable description of what was wrong with the input.
        reason: String,
    },

    /// Every probe reached a terminal failure before any reported ready.
    ///
    /// Contains exactly one record per probe, in the order the identifiers
    /// were supplied.
    #[error("all {} probes failed before any reported ready", .failures.len())]
    AllProbesFailed {
        /// The last error of each probe.
        failures: Vec<ProbeFailure<I>>,
    },

    /// The global deadline elapsed before a winner was determined.
    ///
    /// Some probes may still have been retrying when the deadline fired.
    #[error("no probe became ready within the global timeout ({elapsed:?} elapsed)")]
    GlobalTimeout {
        /// Time spent in the wait call before giving up.
        elapsed: Duration,
    },
}

/// Terminal failure record for a single probe.
#[derive(Debug, Clone)]
pub struct ProbeFailure<I> {
    /// Identifier of the failed probe.
    pub id: I,
    /// The error that stopped the probe's retry loop.
    pub error: ProbeError,
}

/// The reason a single probe stopped retrying.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The check function returned a hard error.
    #[error("probe check returned a terminal error: {0}")]
    Terminal(Arc<dyn std::error::Error + Send + Sync>),

    /// The probe neither reported ready nor returned a terminal error within
    /// its per-probe timeout.
    #[error("probe did not become ready within {timeout:?} ({attempts} attempts)")]
    AttemptsExhausted {
        /// The per-probe timeout that was exhausted.
        timeout: Duration,
        /// Number of check attempts made before the timeout.
        attempts: u32,
    },

    /// The check function panicked.
    ///
    /// Treated as a terminal failure of that probe rather than a failure of
    /// the whole wait call.
    #[error("probe check panicked: {message}")]
    Panicked {
        /// Best-effort rendering of the panic payload.
        message: String,
    },
}

impl ProbeError {
    /// Wraps a hard error returned by a check function.
    pub(crate) fn terminal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Terminal(Arc::new(err))
    }

    /// Converts a panic payload into a terminal probe error.
    pub(crate) fn panicked(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_owned()
        };

        Self::Panicked { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_probes_failed_reports_the_probe_count() {
        let error: RaceWaitError<&str> = RaceWaitError::AllProbesFailed {
            failures: vec![
                ProbeFailure {
                    id: "x",
                    error: ProbeError::Panicked {
                        message: "boom".to_owned(),
                    },
                },
                ProbeFailure {
                    id: "y",
                    error: ProbeError::AttemptsExhausted {
                        timeout: Duration::from_secs(1),
                        attempts: 3,
                    },
                },
            ],
        };

        assert_eq!(
            error.to_string(),
            "all 2 probes failed before any reported ready"
        );
    }

    #[test]
    fn panic_payloads_are_rendered_best_effort() {
        let from_str = ProbeError::panicked(Box::new("boom"));
        assert_eq!(from_str.to_string(), "probe check panicked: boom");

        let from_string = ProbeError::panicked(Box::new("again".to_owned()));
        assert_eq!(from_string.to_string(), "probe check panicked: again");

        let from_other = ProbeError::panicked(Box::new(42_u8));
        assert_eq!(
            from_other.to_string(),
            "probe check panicked: non-string panic payload"
        );
    }

    #[test]
    fn terminal_errors_preserve_the_source_description() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone for good");
        let error = ProbeError::terminal(source);

        assert_eq!(
            error.to_string(),
            "probe check returned a terminal error: gone for good"
        );
    }
}

//! Probe execution: check outcomes, the per-probe state machine, and the
//! retry loop that drives one probe to a terminal report.
//!
//! A probe is stateless from the coordinator's perspective: it is an opaque
//! identifier plus the caller's check function. The retry loop in
//! [`run_probe`] owns everything else - the backoff sequence, the per-probe
//! deadline, and the cancellation receiver it races every await against.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::concurrency::cancel::CancelRx;
use crate::config::BackoffConfig;
use crate::error::ProbeError;

/// Outcome of a single check attempt.
///
/// `NotReady` is not an error: it means "try again later" and is subject to
/// the probe's own retry loop. Hard errors are reported through the check
/// function's `Err` variant instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The probed resource is ready; this probe is a candidate winner.
    Ready,
    /// The probed resource is not ready yet; retry after a backoff delay.
    NotReady,
}

/// Terminal state of one probe within a wait call.
///
/// Every probe starts `Pending` and ends in exactly one of the three other
/// states. There are no transitions out of `Ready`, `Failed`, or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// The probe is still running.
    Pending,
    /// The probe's success was accepted as the outcome of the wait call.
    Ready,
    /// The probe hit a terminal error or exhausted its per-probe timeout.
    Failed,
    /// The probe was stopped because the race was decided without it.
    Cancelled,
}

impl ProbeState {
    fn as_str(&self) -> &'static str {
        match self {
            ProbeState::Pending => "pending",
            ProbeState::Ready => "ready",
            ProbeState::Failed => "failed",
            ProbeState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal report produced by one probe's retry loop.
#[derive(Debug)]
pub(crate) enum ProbeReport<I> {
    /// The probe observed readiness.
    Ready(I),
    /// The probe stopped with a terminal error.
    Failed(I, ProbeError),
    /// The probe observed the cancellation signal while still pending.
    Cancelled(I),
}

/// Drives a single probe to a terminal report.
///
/// Loops over check attempts with jittered exponential backoff until the
/// check reports ready, returns a hard error, the per-probe deadline passes,
/// or cancellation is observed. Both the in-flight check and the backoff
/// sleep race the cancellation receiver, so a cooperative check is stopped at
/// its next await point once the race is decided.
pub(crate) async fn run_probe<I, C, F, E>(
    id: I,
    check: Arc<C>,
    per_probe_timeout: Duration,
    backoff_config: BackoffConfig,
    mut cancel_rx: CancelRx,
) -> ProbeReport<I>
where
    I: Clone + fmt::Display,
    C: Fn(I) -> F,
    F: Future<Output = Result<ProbeStatus, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let deadline = Instant::now() + per_probe_timeout;
    let mut backoff = Backoff::new(backoff_config);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        tokio::select! {
            biased;

            _ = cancel_rx.cancelled() => {
                debug!(probe_id = %id, "cancellation observed, stopping probe");
                return ProbeReport::Cancelled(id);
            }

            attempt = timeout_at(deadline, (check)(id.clone())) => {
                match attempt {
                    Ok(Ok(ProbeStatus::Ready)) => {
                        info!(probe_id = %id, attempts, "probe reported ready");
                        return ProbeReport::Ready(id);
                    }
                    Ok(Ok(ProbeStatus::NotReady)) => {
                        debug!(probe_id = %id, attempts, "probe not ready yet, backing off");
                    }
                    Ok(Err(err)) => {
                        warn!(probe_id = %id, error = %err, "probe returned a terminal error");
                        return ProbeReport::Failed(id, ProbeError::terminal(err));
                    }
                    Err(_) => {
                        return ProbeReport::Failed(
                            id,
                            ProbeError::AttemptsExhausted {
                                timeout: per_probe_timeout,
                                attempts,
                            },
                        );
                    }
                }
            }
        }

        // The next attempt must still start before the per-probe deadline;
        // a wake-up at or past it could only ever time out.
        let wake_at = Instant::now() + backoff.next_delay();
        if wake_at >= deadline {
            return ProbeReport::Failed(
                id,
                ProbeError::AttemptsExhausted {
                    timeout: per_probe_timeout,
                    attempts,
                },
            );
        }

        tokio::select! {
            biased;

            _ = cancel_rx.cancelled() => {
                debug!(probe_id = %id, "cancellation observed during backoff, stopping probe");
                return ProbeReport::Cancelled(id);
            }

            _ = sleep_until(wake_at) => {}
        }
    }
}

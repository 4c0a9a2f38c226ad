//! The wait coordinator: fan out probes, accept the first success, cancel the
//! rest.
//!
//! A [`RaceWaiter`] invocation is a single request/response cycle. All
//! coordination state - the cancellation channel, the task set, the per-probe
//! state map - is scoped to one [`RaceWaiter::wait`] call and discarded with
//! it; nothing leaks between calls.
//!
//! # Tie-breaking
//!
//! Probe reports are consumed by a single consumer, so exactly one success is
//! ever accepted even when several probes become ready in the same scheduling
//! instant. Which of them wins a true race depends on the runtime's actual
//! scheduling and is not stable across runs; callers must not read list-order
//! priority into it.
//!
//! # Cancellation
//!
//! Cancellation is cooperative. Losing probes are stopped at their next await
//! point; a check that blocks its thread cannot be interrupted and may keep
//! running in the background after the call returns. The coordinator bounds
//! how long it waits for stragglers with the configured grace period and
//! reports incomplete cleanup through [`RaceOutcome::cleanup_complete`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::concurrency::cancel::create_cancel_channel;
use crate::config::WaitConfig;
use crate::error::{ProbeError, ProbeFailure, RaceWaitError, RaceWaitResult};
use crate::probe::{ProbeReport, ProbeState, ProbeStatus, run_probe};

/// Successful outcome of a wait call.
#[derive(Debug)]
pub struct RaceOutcome<I> {
    /// The probe whose success was accepted first.
    pub winner: I,
    /// Time from the start of the call until the race was decided, excluding
    /// the cleanup grace period.
    pub elapsed: Duration,
    /// Final state of every probe, the winner included.
    pub probes: HashMap<I, ProbeState>,
    /// False when one or more probes did not acknowledge cancellation within
    /// the grace period and were aborted instead.
    pub cleanup_complete: bool,
}

/// Coordinates a set of independent readiness probes run concurrently,
/// returning the first probe to report ready and cancelling the rest.
#[derive(Debug, Clone, Default)]
pub struct RaceWaiter {
    config: WaitConfig,
}

impl RaceWaiter {
    /// Creates a new waiter with the given configuration.
    pub fn new(config: WaitConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the wait configuration.
    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Runs one readiness probe per identifier and waits for the race to be
    /// decided.
    ///
    /// `check` is invoked concurrently with distinct identifiers. Returning
    /// `Ok(ProbeStatus::NotReady)` schedules a retry after a backoff delay,
    /// bounded by the per-probe timeout; returning an error stops that probe
    /// for good. A panicking check is treated as a terminal failure of that
    /// probe, not of the wait call.
    ///
    /// Returns exactly one of:
    /// - `Ok(outcome)` with the first probe whose check reported ready,
    /// - [`RaceWaitError::AllProbesFailed`] with one record per probe,
    /// - [`RaceWaitError::GlobalTimeout`] when the deadline fired first,
    /// - [`RaceWaitError::InvalidInput`] for an empty or duplicated
    ///   identifier list, reported before any probe is launched.
    pub async fn wait<I, C, F, E>(
        &self,
        identifiers: Vec<I>,
        check: C,
    ) -> RaceWaitResult<RaceOutcome<I>, I>
    where
        I: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static,
        C: Fn(I) -> F + Send + Sync + 'static,
        F: Future<Output = Result<ProbeStatus, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        validate_identifiers(&identifiers)?;

        let started = Instant::now();
        let global_deadline = started + self.config.global_timeout();
        let check = Arc::new(check);
        let (cancel_tx, cancel_rx) = create_cancel_channel();

        let mut join_set: JoinSet<ProbeReport<I>> = JoinSet::new();
        let mut states: HashMap<I, ProbeState> = identifiers
            .iter()
            .cloned()
            .map(|id| (id, ProbeState::Pending))
            .collect();

        for id in identifiers.iter().cloned() {
            let probe = run_probe(
                id.clone(),
                Arc::clone(&check),
                self.config.per_probe_timeout(),
                self.config.backoff.clone(),
                cancel_rx.clone(),
            );
            join_set.spawn(async move {
                match AssertUnwindSafe(probe).catch_unwind().await {
                    Ok(report) => report,
                    Err(payload) => ProbeReport::Failed(id, ProbeError::panicked(payload)),
                }
            });
        }

        // Probes hold their own receivers; the coordinator keeps only the
        // transmitter so that dropping it cancels everything.
        drop(cancel_rx);

        debug!(probes = identifiers.len(), "launched readiness probes");

        let mut failures: HashMap<I, ProbeError> = HashMap::new();
        let mut winner: Option<I> = None;
        let mut timed_out = false;

        while !join_set.is_empty() {
            match timeout_at(global_deadline, join_set.join_next()).await {
                Err(_) => {
                    timed_out = true;
                    break;
                }
                Ok(None) => break,
                Ok(Some(Ok(ProbeReport::Ready(id)))) => {
                    states.insert(id.clone(), ProbeState::Ready);
                    winner = Some(id);
                    break;
                }
                Ok(Some(Ok(ProbeReport::Failed(id, error)))) => {
                    warn!(probe_id = %id, error = %error, "probe failed");
                    states.insert(id.clone(), ProbeState::Failed);
                    failures.insert(id, error);
                }
                Ok(Some(Ok(ProbeReport::Cancelled(id)))) => {
                    // Not reachable before cancellation is signalled, but a
                    // report is a report.
                    states.insert(id, ProbeState::Cancelled);
                }
                Ok(Some(Err(join_error))) => {
                    if join_error.is_cancelled() {
                        debug!("probe task was aborted");
                    } else {
                        warn!(error = %join_error, "probe task failed to join");
                    }
                }
            }
        }

        // Decide first, clean up second: stragglers cannot change the
        // outcome. Cancelling with no receivers left means every probe has
        // already reported; the error is irrelevant.
        let _ = cancel_tx.cancel();
        let elapsed = started.elapsed();

        let cleanup_complete =
            drain_probes(join_set, self.config.grace_period(), &mut states).await;

        if let Some(winner) = winner {
            info!(winner = %winner, ?elapsed, "probe race won");
            return Ok(RaceOutcome {
                winner,
                elapsed,
                probes: states,
                cleanup_complete,
            });
        }

        if !timed_out && failures.len() == identifiers.len() {
            warn!(
                probes = identifiers.len(),
                ?elapsed,
                "all probes failed before any reported ready"
            );
            let failures = identifiers
                .into_iter()
                .filter_map(|id| {
                    failures
                        .remove(&id)
                        .map(|error| ProbeFailure { id, error })
                })
                .collect();
            return Err(RaceWaitError::AllProbesFailed { failures });
        }

        warn!(?elapsed, "global timeout elapsed before any probe reported ready");
        Err(RaceWaitError::GlobalTimeout { elapsed })
    }
}

/// Fails fast on caller errors in the identifier list.
fn validate_identifiers<I>(identifiers: &[I]) -> Result<(), RaceWaitError<I>>
where
    I: Eq + Hash + fmt::Debug + fmt::Display,
{
    if identifiers.is_empty() {
        return Err(RaceWaitError::InvalidInput {
            reason: "at least one probe identifier is required".to_owned(),
        });
    }

    let mut seen = HashSet::with_capacity(identifiers.len());
    for id in identifiers {
        if !seen.insert(id) {
            return Err(RaceWaitError::InvalidInput {
                reason: format!("duplicate probe identifier: {id}"),
            });
        }
    }

    Ok(())
}

/// Waits for cancelled probes to acknowledge cancellation, bounded by the
/// grace period.
///
/// Returns true when every probe exited on its own; false when the grace
/// period elapsed first and the remaining tasks had to be aborted.
async fn drain_probes<I>(
    mut join_set: JoinSet<ProbeReport<I>>,
    grace_period: Duration,
    states: &mut HashMap<I, ProbeState>,
) -> bool
where
    I: Eq + Hash + fmt::Display + 'static,
{
    if join_set.is_empty() {
        return true;
    }

    let drain_deadline = Instant::now() + grace_period;

    loop {
        match timeout_at(drain_deadline, join_set.join_next()).await {
            Ok(None) => return true,
            Ok(Some(Ok(ProbeReport::Cancelled(id)))) => {
                states.insert(id, ProbeState::Cancelled);
            }
            Ok(Some(Ok(ProbeReport::Failed(id, error)))) => {
                debug!(probe_id = %id, error = %error, "probe failed after the race was decided");
                states.insert(id, ProbeState::Failed);
            }
            Ok(Some(Ok(ProbeReport::Ready(id)))) => {
                // A success that lost the race: its report arrived after the
                // single consumer had already accepted another one.
                debug!(probe_id = %id, "probe became ready after the race was decided");
                states.insert(id, ProbeState::Cancelled);
            }
            Ok(Some(Err(join_error))) => {
                if !join_error.is_cancelled() {
                    warn!(error = %join_error, "probe task failed to join during cleanup");
                }
            }
            Err(_) => {
                warn!(
                    stragglers = join_set.len(),
                    ?grace_period,
                    "probes did not acknowledge cancellation within the grace period"
                );
                join_set.abort_all();
                for state in states.values_mut() {
                    if *state == ProbeState::Pending {
                        *state = ProbeState::Cancelled;
                    }
                }
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use crate::config::BackoffConfig;

    use super::*;

    fn waiter(per_probe_ms: u64, global_ms: u64, grace_ms: u64) -> RaceWaiter {
        RaceWaiter::new(WaitConfig {
            per_probe_timeout_ms: per_probe_ms,
            global_timeout_ms: global_ms,
            grace_period_ms: grace_ms,
            backoff: BackoffConfig {
                initial_delay_ms: 10,
                max_delay_ms: 50,
                multiplier: 2.0,
            },
        })
    }

    async fn never_launched(_id: &'static str) -> Result<ProbeStatus, Infallible> {
        unreachable!("no probe should be launched")
    }

    async fn exploding(_id: &'static str) -> Result<ProbeStatus, Infallible> {
        panic!("probe exploded")
    }

    #[tokio::test]
    async fn empty_identifier_list_is_rejected_before_launch() {
        let waiter = waiter(1000, 1000, 100);

        let result = waiter
            .wait(Vec::<&'static str>::new(), never_launched)
            .await;

        match result {
            Err(RaceWaitError::InvalidInput { reason }) => {
                assert!(reason.contains("at least one"));
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_identifiers_are_rejected_before_launch() {
        let waiter = waiter(1000, 1000, 100);

        let result = waiter.wait(vec!["a", "b", "a"], never_launched).await;

        match result {
            Err(RaceWaitError::InvalidInput { reason }) => {
                assert!(reason.contains("duplicate"));
                assert!(reason.contains('a'));
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_check_is_a_terminal_probe_failure() {
        let waiter = waiter(1000, 1000, 100);

        let result = waiter.wait(vec!["p"], exploding).await;

        match result {
            Err(RaceWaitError::AllProbesFailed { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].id, "p");
                assert!(matches!(
                    failures[0].error,
                    ProbeError::Panicked { ref message } if message.contains("probe exploded")
                ));
            }
            other => panic!("expected all probes failed, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn blocking_check_trips_the_grace_period() {
        let waiter = waiter(5000, 5000, 50);

        let outcome = waiter
            .wait(vec!["fast", "stuck"], |id: &'static str| async move {
                if id == "fast" {
                    Ok::<_, Infallible>(ProbeStatus::Ready)
                } else {
                    // A check that blocks its thread cannot observe
                    // cooperative cancellation until the blocking call ends.
                    std::thread::sleep(Duration::from_millis(400));
                    Ok(ProbeStatus::NotReady)
                }
            })
            .await
            .expect("fast probe should win");

        assert_eq!(outcome.winner, "fast");
        assert!(!outcome.cleanup_complete);
        assert_eq!(outcome.probes[&"stuck"], ProbeState::Cancelled);
    }

    #[tokio::test]
    async fn winner_state_map_covers_every_probe() {
        let waiter = waiter(1000, 1000, 200);

        let outcome = waiter
            .wait(vec!["a", "b"], |id: &'static str| async move {
                if id == "a" {
                    Ok::<_, Infallible>(ProbeStatus::Ready)
                } else {
                    std::future::pending().await
                }
            })
            .await
            .expect("probe a should win");

        assert_eq!(outcome.winner, "a");
        assert_eq!(outcome.probes.len(), 2);
        assert_eq!(outcome.probes[&"a"], ProbeState::Ready);
        assert_eq!(outcome.probes[&"b"], ProbeState::Cancelled);
        assert!(outcome.cleanup_complete);
    }
}

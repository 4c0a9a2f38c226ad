pub mod backoff;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod probe;
pub mod waiter;

pub use config::{BackoffConfig, WaitConfig};
pub use error::{ProbeError, ProbeFailure, RaceWaitError, RaceWaitResult};
pub use probe::{ProbeState, ProbeStatus};
pub use waiter::{RaceOutcome, RaceWaiter};

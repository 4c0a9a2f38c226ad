//! Concurrency utilities for coordinating probe executions.
//!
//! A wait call shares exactly one piece of mutable coordination state between
//! its probes: the cancellation channel defined in [`cancel`]. Everything else
//! a probe touches is owned by its own task.

pub mod cancel;

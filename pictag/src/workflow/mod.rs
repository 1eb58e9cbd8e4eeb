//! Batch cataloging workflow

pub mod batch;
pub mod failure_log;

pub use batch::{BatchCoordinator, BatchOptions, BatchSummary};
pub use failure_log::FailureLog;

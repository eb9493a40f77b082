//! Reelsync Worker
//!
//! The polling monitor: each tick reconciles stale uploads, admits new files
//! from the watched directory, dispatches pending records to the uploader with
//! bounded retry, and sweeps local copies past the retention window.

pub mod monitor;
pub mod retry;
pub mod scanner;

pub use monitor::{Monitor, TickSummary};
pub use retry::RetryPolicy;
pub use scanner::{probe, Probe, Scanner};

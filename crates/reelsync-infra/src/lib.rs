//! Reelsync Infrastructure Library
//!
//! Process-level plumbing shared by the binaries:
//! - Telemetry initialization
//! - Shutdown signal handling

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod signal;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};

pub use signal::shutdown_signal;

//! Liveness watchdog
//!
//! Monitor groups hold probes that each try to acquire a controller's
//! execution lock. The [`Watchdog`] arms every group on a timer and escalates
//! through an [`EscalationSink`] once any group stays blocked past its
//! timeout.

pub mod monitor;
#[allow(clippy::module_inception)]
pub mod watchdog;

pub use monitor::{lock_probe, Completion, GroupStatus, MonitorGroup, Probe};
pub use watchdog::{EscalationSink, Watchdog};

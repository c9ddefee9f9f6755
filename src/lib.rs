//! Audio Control - worker controllers for device audio paths
//!
//! Each audio subsystem (playback, PCM capture, VOIP loopback) is driven by a
//! long-lived worker thread that polls a single-slot "last command wins"
//! mailbox. A liveness watchdog probes every worker by briefly taking the lock
//! the worker holds while it talks to the audio backend, and escalates to a
//! fatal sink when a probe stays blocked past its timeout.
//!
//! ## Architecture
//!
//! ```text
//! caller ── send(cmd) ──> Mailbox ──take()──> Worker ──exec lock──> AudioBackend
//!                                               ^
//! Watchdog ── arm ──> MonitorGroup ── probe ────┘ (lock, release)
//!     │
//!     └── Overdue ──> EscalationSink::on_fatal(groups)
//! ```

pub mod audio;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod router;
pub mod watchdog;

pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

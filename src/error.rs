//! Error types

use serde::Serialize;
use thiserror::Error;

/// Crate-wide error
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Watchdog(#[from] WatchdogError),

    #[error("Failed to spawn thread {name}: {reason}")]
    Spawn { name: String, reason: String },

    #[error("Worker {0} panicked")]
    WorkerPanicked(String),
}

/// Crate-wide result
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by the audio backend
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Per-slot command failure.
///
/// Recorded on the addressed slot and logged; never returned to the sender
/// and never fatal to the worker.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SlotError {
    #[error("Invalid slot index {index} (slots: {capacity})")]
    InvalidIndex { index: usize, capacity: usize },

    #[error("Slot {0} is busy")]
    SlotBusy(usize),

    #[error("Slot {0} is empty")]
    SlotEmpty(usize),

    #[error("Failed to open resource: {0}")]
    ResourceInit(BackendError),

    #[error("Resource failed: {0}")]
    ResourceRuntime(BackendError),
}

impl SlotError {
    /// Busy/empty mismatches, as opposed to index or resource failures
    pub fn is_conflict(&self) -> bool {
        matches!(self, SlotError::SlotBusy(_) | SlotError::SlotEmpty(_))
    }

    /// Failures that came from the backend
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            SlotError::ResourceInit(_) | SlotError::ResourceRuntime(_)
        )
    }
}

/// Watchdog setup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    #[error("Monitor {0} can't be registered once the watchdog is running")]
    RegistrationAfterStart(String),

    #[error("Invalid watchdog timing: {0}")]
    InvalidTiming(String),

    #[error("Watchdog is already running")]
    AlreadyStarted,

    #[error("Failed to spawn watchdog thread: {0}")]
    Spawn(String),
}

/// Command line routing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

//! Worker loop
//!
//! ```text
//!   Idle ──take()──> Executing(cmd) ──done──> Idle
//!     │
//!     └──── shutdown observed ──> ShuttingDown ──teardown──> Stopped
//! ```
//!
//! Each cycle takes at most one command from the mailbox. With nothing
//! pending the worker sleeps one poll interval; only a shutdown request cuts
//! that sleep short. Commands run while holding the execution lock, so a
//! watchdog probe blocks for exactly as long as a handler is inside the
//! backend.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::controller::mailbox::Mailbox;
use crate::controller::slots::SlotsSnapshot;

/// A subsystem driven by a worker thread
pub trait Subsystem: Send + 'static {
    /// Command type carried by the mailbox
    type Command: fmt::Debug + Send + 'static;

    /// Name used for the thread and log lines
    fn name(&self) -> &str;

    /// Run one command. Failures are recorded on the addressed slot.
    fn execute(&mut self, command: Self::Command);

    /// Close every occupied slot, in index order
    fn teardown(&mut self);

    /// Current slot state
    fn snapshot(&self) -> SlotsSnapshot;
}

/// Worker thread state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for a command
    Idle,
    /// Running a command against the backend; holds its debug rendering
    Executing(String),
    /// Shutdown observed, tearing down slots
    ShuttingDown,
    /// Thread finished
    Stopped,
}

/// State shared between a controller handle and its worker thread
pub(crate) struct WorkerShared<C> {
    pub(crate) mailbox: Mailbox<C>,
    pub(crate) exec_lock: Arc<Mutex<()>>,
    pub(crate) state: Mutex<WorkerState>,
    pub(crate) snapshot: RwLock<SlotsSnapshot>,
    pub(crate) executed: AtomicU64,
}

impl<C: fmt::Debug> WorkerShared<C> {
    pub(crate) fn new(initial: SlotsSnapshot) -> Self {
        Self {
            mailbox: Mailbox::new(),
            exec_lock: Arc::new(Mutex::new(())),
            state: Mutex::new(WorkerState::Idle),
            snapshot: RwLock::new(initial),
            executed: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }
}

/// Worker thread body. Returns the subsystem once stopped.
pub(crate) fn run_worker<S: Subsystem>(
    mut subsystem: S,
    shared: Arc<WorkerShared<S::Command>>,
    poll_interval: Duration,
) -> S {
    tracing::debug!("{} worker started", subsystem.name());

    loop {
        if shared.mailbox.is_shutdown() {
            break;
        }

        match shared.mailbox.take() {
            None => {
                if shared.mailbox.idle_wait(poll_interval) {
                    break;
                }
            }
            Some(command) => {
                let rendered = format!("{:?}", command);
                tracing::debug!("{} executing {}", subsystem.name(), rendered);
                shared.set_state(WorkerState::Executing(rendered));
                {
                    let _exec = shared.exec_lock.lock();
                    subsystem.execute(command);
                }
                shared.executed.fetch_add(1, Ordering::Relaxed);
                *shared.snapshot.write() = subsystem.snapshot();
                shared.set_state(WorkerState::Idle);
            }
        }
    }

    shared.set_state(WorkerState::ShuttingDown);
    {
        let _exec = shared.exec_lock.lock();
        subsystem.teardown();
    }
    *shared.snapshot.write() = subsystem.snapshot();
    shared.set_state(WorkerState::Stopped);

    tracing::info!("{} worker exit", subsystem.name());
    subsystem
}

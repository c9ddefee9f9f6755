//! Controller handle
//!
//! A controller owns one worker thread and its mailbox. The command API is
//! fire-and-forget: `send` overwrites any unconsumed command and returns
//! immediately. Results are visible only through [`Controller::slots`] and
//! the logs.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::ControllerConfig;
use crate::controller::mailbox::MailboxStats;
use crate::controller::slots::SlotsSnapshot;
use crate::controller::worker::{run_worker, Subsystem, WorkerShared, WorkerState};
use crate::error::Error;
use crate::watchdog::{lock_probe, Probe};

/// Handle to a subsystem worker thread
pub struct Controller<S: Subsystem> {
    /// Name used for the worker thread and watchdog registration
    name: String,

    /// Mailbox, execution lock and published state
    shared: Arc<WorkerShared<S::Command>>,

    /// Worker thread handle; `None` once shut down
    thread_handle: Option<JoinHandle<S>>,
}

impl<S: Subsystem> Controller<S> {
    /// Start a worker thread for `subsystem`
    pub fn spawn(subsystem: S, config: &ControllerConfig) -> crate::Result<Self> {
        config.validate()?;
        let name = subsystem.name().to_string();
        let shared = Arc::new(WorkerShared::new(subsystem.snapshot()));
        let poll_interval = config.poll_interval();

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-worker", name))
            .spawn(move || run_worker(subsystem, worker_shared, poll_interval))
            .map_err(|e| Error::Spawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("{} controller started (poll {:?})", name, poll_interval);

        Ok(Self {
            name,
            shared,
            thread_handle: Some(handle),
        })
    }

    /// Submit a command. Replaces any command the worker hasn't taken yet.
    pub fn send(&self, command: S::Command) {
        if self.shared.mailbox.is_shutdown() {
            tracing::debug!("{} is shutting down, ignoring {:?}", self.name, command);
            return;
        }
        self.shared.mailbox.send(command);
    }

    /// Get controller name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get worker state
    pub fn state(&self) -> WorkerState {
        self.shared.state.lock().clone()
    }

    /// Check if a command is waiting to be taken by the worker
    pub fn has_pending(&self) -> bool {
        self.shared.mailbox.has_pending()
    }

    /// Slot state as of the last executed command
    pub fn slots(&self) -> SlotsSnapshot {
        self.shared.snapshot.read().clone()
    }

    /// Number of commands the worker has executed
    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    /// Mailbox delivery counters
    pub fn mailbox_stats(&self) -> MailboxStats {
        self.shared.mailbox.stats()
    }

    /// Liveness probe: acquire and release the worker's execution lock
    pub fn probe(&self) -> Probe {
        lock_probe(self.shared.exec_lock.clone())
    }

    /// Check if the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Request cooperative shutdown and wait for the worker.
    ///
    /// An in-flight command runs to completion first; then every occupied
    /// slot is closed in index order. Returns the subsystem, or `None` if the
    /// controller was already shut down.
    pub fn shutdown(&mut self) -> crate::Result<Option<S>> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(None);
        };

        self.shared.mailbox.request_shutdown();
        tracing::info!("{} controller shutting down", self.name);

        handle
            .join()
            .map(Some)
            .map_err(|_| Error::WorkerPanicked(self.name.clone()))
    }
}

impl<S: Subsystem> Drop for Controller<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("{}", e);
        }
    }
}

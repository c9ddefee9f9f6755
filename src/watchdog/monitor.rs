//! Monitor groups
//!
//! A monitor group is a named set of probes checked together on one timer.
//! Each group owns a probing thread that waits to be armed, runs every probe
//! in registration order and then marks the cycle complete. A probe that
//! never returns leaves the cycle incomplete, and its elapsed time keeps
//! growing from the original arm timestamp until the group is overdue.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::WatchdogError;

/// Liveness check. Returns once the target is responsive.
pub type Probe = Arc<dyn Fn() + Send + Sync + 'static>;

/// Probe that acquires `lock` and releases it immediately.
///
/// Blocks for as long as another thread holds the lock, which is how a hung
/// command handler becomes visible from outside.
pub fn lock_probe<T: Send + 'static>(lock: Arc<Mutex<T>>) -> Probe {
    Arc::new(move || {
        drop(lock.lock());
    })
}

/// Staleness of a group's current check cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Every probe returned
    Completed,
    /// Less than half the timeout elapsed
    Waiting,
    /// At least half the timeout elapsed
    WaitedHalf,
    /// Timeout elapsed
    Overdue,
}

impl Completion {
    /// Classify an incomplete cycle that has been running for `elapsed`
    pub fn classify(elapsed: Duration, timeout: Duration) -> Self {
        if elapsed < timeout / 2 {
            Completion::Waiting
        } else if elapsed < timeout {
            Completion::WaitedHalf
        } else {
            Completion::Overdue
        }
    }
}

/// Reportable state of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatus {
    pub name: String,
    pub completion: Completion,
    /// Age of the incomplete cycle
    pub elapsed_ms: Option<u64>,
    /// Probe the cycle is currently waiting on
    pub blocked_in: Option<String>,
    /// Completed cycles since start
    pub cycles: u64,
}

struct NamedProbe {
    label: String,
    probe: Probe,
}

struct CheckState {
    completed: bool,
    armed_at: Instant,
    current: Option<usize>,
    cycles: u64,
}

/// Named collection of probes sharing one timeout
pub struct MonitorGroup {
    /// Group name reported on escalation
    name: String,

    /// Fatal timeout for one cycle
    timeout: Duration,

    /// Registered probes; frozen once probing starts
    probes: RwLock<Vec<NamedProbe>>,

    /// Cycle bookkeeping shared with the probing thread
    state: Arc<Mutex<CheckState>>,

    /// Arm signal to the probing thread; dropped on stop
    arm_tx: Mutex<Option<Sender<()>>>,

    /// One-way exit flag
    exit: Arc<AtomicBool>,

    /// Probing thread; never joined, it may be stuck in a probe
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorGroup {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            probes: RwLock::new(Vec::new()),
            state: Arc::new(Mutex::new(CheckState {
                completed: true,
                armed_at: Instant::now(),
                current: None,
                cycles: 0,
            })),
            arm_tx: Mutex::new(None),
            exit: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of registered probes
    pub fn probe_count(&self) -> usize {
        self.probes.read().len()
    }

    /// Register a probe. Only valid before probing starts.
    pub fn add_probe(&self, label: impl Into<String>, probe: Probe) -> Result<(), WatchdogError> {
        if self.thread_handle.lock().is_some() || self.exit.load(Ordering::SeqCst) {
            return Err(WatchdogError::RegistrationAfterStart(self.name.clone()));
        }
        self.probes.write().push(NamedProbe {
            label: label.into(),
            probe,
        });
        Ok(())
    }

    /// Spawn the probing thread
    pub(crate) fn start_probing(&self) -> Result<(), WatchdogError> {
        let mut handle_slot = self.thread_handle.lock();
        if handle_slot.is_some() {
            return Err(WatchdogError::AlreadyStarted);
        }

        let probes: Vec<(String, Probe)> = self
            .probes
            .read()
            .iter()
            .map(|p| (p.label.clone(), p.probe.clone()))
            .collect();

        let (arm_tx, arm_rx) = bounded::<()>(1);
        let state = self.state.clone();
        let exit = self.exit.clone();
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("monitor-{}", self.name))
            .spawn(move || Self::probe_loop(name, probes, arm_rx, state, exit))
            .map_err(|e| WatchdogError::Spawn(e.to_string()))?;

        *self.arm_tx.lock() = Some(arm_tx);
        *handle_slot = Some(handle);
        Ok(())
    }

    /// Probing thread body
    fn probe_loop(
        name: String,
        probes: Vec<(String, Probe)>,
        arm_rx: Receiver<()>,
        state: Arc<Mutex<CheckState>>,
        exit: Arc<AtomicBool>,
    ) {
        // Ends when the arm sender is dropped
        for () in arm_rx.iter() {
            if exit.load(Ordering::SeqCst) {
                break;
            }

            for (index, (_, probe)) in probes.iter().enumerate() {
                state.lock().current = Some(index);
                probe();
            }

            let mut state = state.lock();
            state.completed = true;
            state.current = None;
            state.cycles += 1;
        }
        tracing::debug!("{} monitor thread exit", name);
    }

    /// Start a new check cycle.
    ///
    /// A cycle that is still incomplete is left alone so that its elapsed
    /// time keeps counting from the original arm timestamp.
    pub fn schedule_check(&self) {
        let mut state = self.state.lock();
        if self.probe_count() == 0 {
            state.completed = true;
            return;
        }
        if !state.completed || self.exit.load(Ordering::SeqCst) {
            return;
        }
        state.completed = false;
        state.current = None;
        state.armed_at = Instant::now();
        drop(state);

        if let Some(tx) = self.arm_tx.lock().as_ref() {
            let _ = tx.try_send(());
        }
    }

    /// Classify the current cycle
    pub fn completion(&self) -> Completion {
        let state = self.state.lock();
        if state.completed {
            Completion::Completed
        } else {
            Completion::classify(state.armed_at.elapsed(), self.timeout)
        }
    }

    /// Group name plus the probe it is stuck in, for log lines
    pub fn describe_blocked(&self) -> String {
        match self.status().blocked_in {
            Some(label) => format!("{} (blocked in {})", self.name, label),
            None => self.name.clone(),
        }
    }

    /// Reportable state
    pub fn status(&self) -> GroupStatus {
        let state = self.state.lock();
        let completion = if state.completed {
            Completion::Completed
        } else {
            Completion::classify(state.armed_at.elapsed(), self.timeout)
        };
        let blocked_in = state
            .current
            .and_then(|i| self.probes.read().get(i).map(|p| p.label.clone()));

        GroupStatus {
            name: self.name.clone(),
            completion,
            elapsed_ms: (!state.completed).then(|| state.armed_at.elapsed().as_millis() as u64),
            blocked_in,
            cycles: state.cycles,
        }
    }

    /// Stop the probing thread. Idempotent and one-way.
    pub fn stop(&self) {
        if self.exit.swap(true, Ordering::SeqCst) {
            return;
        }
        self.arm_tx.lock().take();
        tracing::debug!("{} monitor stopped", self.name);
    }

    /// Check if the probing thread is alive
    pub fn is_probing(&self) -> bool {
        self.thread_handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

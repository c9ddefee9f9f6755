//! Liveness watchdog
//!
//! The supervisory thread arms every monitor group once per check interval,
//! waits one interval, then classifies each group. When the worst group is
//! overdue it stops every group's probing thread and hands the names of the
//! overdue groups to the escalation sink, then exits. Nothing else leaves the
//! watchdog: escalation is the only fatal signal it produces.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::WatchdogConfig;
use crate::error::WatchdogError;
use crate::watchdog::monitor::{Completion, GroupStatus, MonitorGroup, Probe};

/// Receiver of the fatal escalation (show a dialog, kill the process, ...)
pub trait EscalationSink: Send + Sync + 'static {
    fn on_fatal(&self, groups: &[String]);
}

impl<F> EscalationSink for F
where
    F: Fn(&[String]) + Send + Sync + 'static,
{
    fn on_fatal(&self, groups: &[String]) {
        self(groups)
    }
}

/// Supervisor over all monitor groups
pub struct Watchdog {
    /// Timing for every group registered without an explicit timeout
    config: WatchdogConfig,

    /// Groups in registration order
    groups: Vec<Arc<MonitorGroup>>,

    /// Fatal action
    sink: Arc<dyn EscalationSink>,

    /// Names handed to the sink, once escalated
    escalated: Arc<Mutex<Option<Vec<String>>>>,

    /// Wakes the supervisory loop for shutdown
    shutdown_tx: Option<Sender<()>>,

    /// Supervisory thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Set once `start` has run; registration is closed from then on
    started: bool,
}

impl Watchdog {
    /// Create a stopped watchdog
    pub fn new(config: WatchdogConfig, sink: impl EscalationSink) -> Result<Self, WatchdogError> {
        config.validate()?;
        Ok(Self {
            config,
            groups: Vec::new(),
            sink: Arc::new(sink),
            escalated: Arc::new(Mutex::new(None)),
            shutdown_tx: None,
            thread_handle: None,
            started: false,
        })
    }

    /// Register `probe` under `group_name` with its own timeout.
    ///
    /// Probes registered under the same name share one group and are checked
    /// in registration order. Fails once the watchdog has started.
    pub fn register(
        &mut self,
        group_name: &str,
        timeout: Duration,
        probe: Probe,
    ) -> Result<(), WatchdogError> {
        if self.started {
            return Err(WatchdogError::RegistrationAfterStart(group_name.to_string()));
        }
        if timeout.is_zero() {
            return Err(WatchdogError::InvalidTiming(format!(
                "{}: timeout must be non-zero",
                group_name
            )));
        }

        let group = match self.groups.iter().find(|g| g.name() == group_name) {
            Some(group) => {
                if group.timeout() != timeout {
                    tracing::warn!(
                        "{}: keeping timeout {:?}, ignoring {:?}",
                        group_name,
                        group.timeout(),
                        timeout
                    );
                }
                group.clone()
            }
            None => {
                let group = Arc::new(MonitorGroup::new(group_name, timeout));
                self.groups.push(group.clone());
                group
            }
        };

        let label = format!("{}#{}", group_name, group.probe_count());
        group.add_probe(label, probe)?;
        tracing::debug!("Watchdog: add monitor {}", group_name);
        Ok(())
    }

    /// Register with the configured timeout
    pub fn add_monitor(&mut self, group_name: &str, probe: Probe) -> Result<(), WatchdogError> {
        let timeout = self.config.timeout();
        self.register(group_name, timeout, probe)
    }

    /// Start every probing thread and the supervisory loop
    pub fn start(&mut self) -> Result<(), WatchdogError> {
        if self.started {
            return Err(WatchdogError::AlreadyStarted);
        }
        self.started = true;

        for group in &self.groups {
            group.start_probing()?;
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let groups = self.groups.clone();
        let sink = self.sink.clone();
        let escalated = self.escalated.clone();
        let check_interval = self.config.check_interval();

        let handle = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                tracing::info!(
                    "Watchdog thread start ({} groups, check every {:?})",
                    groups.len(),
                    check_interval
                );

                loop {
                    for group in &groups {
                        group.schedule_check();
                    }

                    match shutdown_rx.recv_timeout(check_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if let Some(blocked) = Self::evaluate(&groups) {
                        for group in &groups {
                            group.stop();
                        }
                        *escalated.lock() = Some(blocked.clone());
                        sink.on_fatal(&blocked);
                        break;
                    }
                }

                tracing::info!("Watchdog thread exit");
            })
            .map_err(|e| WatchdogError::Spawn(e.to_string()))?;

        self.shutdown_tx = Some(shutdown_tx);
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Classify all groups. Returns the overdue group names when the worst
    /// classification is `Overdue`.
    fn evaluate(groups: &[Arc<MonitorGroup>]) -> Option<Vec<String>> {
        let completions: Vec<(&Arc<MonitorGroup>, Completion)> =
            groups.iter().map(|g| (g, g.completion())).collect();

        let worst = completions
            .iter()
            .map(|(_, c)| *c)
            .max()
            .unwrap_or(Completion::Completed);

        match worst {
            Completion::Overdue => {
                let blocked: Vec<String> = completions
                    .iter()
                    .filter(|(_, c)| *c == Completion::Overdue)
                    .map(|(g, _)| {
                        tracing::error!(
                            "*** WATCHDOG: {} not responding ***",
                            g.describe_blocked()
                        );
                        g.name().to_string()
                    })
                    .collect();
                Some(blocked)
            }
            Completion::WaitedHalf => {
                for (group, _) in completions
                    .iter()
                    .filter(|(_, c)| *c == Completion::WaitedHalf)
                {
                    tracing::warn!("Watchdog: {} waited half", group.describe_blocked());
                }
                None
            }
            _ => None,
        }
    }

    /// Stop the supervisory loop and every probing thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        for group in &self.groups {
            group.stop();
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Watchdog thread panicked");
            }
        }
    }

    /// Check if the supervisory loop is running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Groups reported to the sink, if escalation happened
    pub fn escalated(&self) -> Option<Vec<String>> {
        self.escalated.lock().clone()
    }

    /// Current state of every group
    pub fn snapshot(&self) -> Vec<GroupStatus> {
        self.groups.iter().map(|g| g.status()).collect()
    }

    /// Get a group by name
    pub fn group(&self, name: &str) -> Option<&MonitorGroup> {
        self.groups.iter().find(|g| g.name() == name).map(|g| g.as_ref())
    }

    pub fn check_interval(&self) -> Duration {
        self.config.check_interval()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::monitor::lock_probe;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(200);
    const CHECK: Duration = Duration::from_millis(100);

    fn recording_watchdog() -> (Watchdog, Arc<Mutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink_calls = calls.clone();
        let watchdog = Watchdog::new(
            WatchdogConfig::with_timing(TIMEOUT, CHECK),
            move |groups: &[String]| sink_calls.lock().push(groups.to_vec()),
        )
        .unwrap();
        (watchdog, calls)
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_register_after_start_fails() {
        let (mut watchdog, _) = recording_watchdog();
        watchdog.add_monitor("a", Arc::new(|| {})).unwrap();
        watchdog.start().unwrap();

        assert_eq!(
            watchdog.add_monitor("b", Arc::new(|| {})),
            Err(WatchdogError::RegistrationAfterStart("b".into()))
        );
        assert_eq!(watchdog.start(), Err(WatchdogError::AlreadyStarted));
    }

    #[test]
    fn test_same_name_shares_group() {
        let (mut watchdog, _) = recording_watchdog();
        watchdog.register("audio", TIMEOUT, Arc::new(|| {})).unwrap();
        watchdog.register("audio", TIMEOUT, Arc::new(|| {})).unwrap();
        watchdog.register("other", TIMEOUT, Arc::new(|| {})).unwrap();

        assert_eq!(watchdog.snapshot().len(), 2);
        assert_eq!(watchdog.group("audio").unwrap().probe_count(), 2);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let (mut watchdog, _) = recording_watchdog();
        assert!(matches!(
            watchdog.register("a", Duration::ZERO, Arc::new(|| {})),
            Err(WatchdogError::InvalidTiming(_))
        ));
    }

    #[test]
    fn test_healthy_groups_never_escalate() {
        let (mut watchdog, calls) = recording_watchdog();
        let target = Arc::new(Mutex::new(()));
        watchdog.add_monitor("healthy", lock_probe(target)).unwrap();
        watchdog.start().unwrap();

        thread::sleep(Duration::from_millis(600));
        assert!(calls.lock().is_empty());
        assert!(watchdog.is_running());
        assert!(watchdog.snapshot()[0].cycles >= 3);
    }

    #[test]
    fn test_short_holds_never_escalate() {
        let (mut watchdog, calls) = recording_watchdog();
        let target = Arc::new(Mutex::new(()));
        watchdog.add_monitor("busy", lock_probe(target.clone())).unwrap();
        watchdog.start().unwrap();

        // Hold well under timeout/2, repeatedly
        let deadline = Instant::now() + Duration::from_millis(700);
        while Instant::now() < deadline {
            let guard = target.lock();
            thread::sleep(Duration::from_millis(40));
            drop(guard);
            thread::sleep(Duration::from_millis(20));
        }

        assert!(calls.lock().is_empty());
        assert!(watchdog.escalated().is_none());
    }

    #[test]
    fn test_blocked_group_escalates_alone() {
        let (mut watchdog, calls) = recording_watchdog();
        let stuck = Arc::new(Mutex::new(()));
        let healthy = Arc::new(Mutex::new(()));
        watchdog.add_monitor("stuck", lock_probe(stuck.clone())).unwrap();
        watchdog.add_monitor("healthy", lock_probe(healthy)).unwrap();

        let _guard = stuck.lock();
        let start = Instant::now();
        watchdog.start().unwrap();

        thread::sleep(Duration::from_millis(150));
        let snapshot = watchdog.snapshot();
        assert_ne!(snapshot[0].completion, Completion::Completed);
        assert_eq!(snapshot[1].completion, Completion::Completed);

        assert!(wait_until(Duration::from_secs(3), || !calls.lock().is_empty()));
        assert!(start.elapsed() >= TIMEOUT);
        assert_eq!(calls.lock().as_slice(), [vec!["stuck".to_string()]]);
        assert_eq!(watchdog.escalated(), Some(vec!["stuck".to_string()]));

        // Escalation is terminal: the loop exits and the healthy group's
        // probing thread is released
        assert!(wait_until(Duration::from_secs(1), || !watchdog.is_running()));
        assert!(wait_until(Duration::from_secs(1), || {
            !watchdog.group("healthy").unwrap().is_probing()
        }));
        thread::sleep(Duration::from_millis(300));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut watchdog, calls) = recording_watchdog();
        watchdog.add_monitor("a", Arc::new(|| {})).unwrap();
        watchdog.start().unwrap();

        let start = Instant::now();
        watchdog.stop();
        watchdog.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!watchdog.is_running());
        assert!(calls.lock().is_empty());
    }
}

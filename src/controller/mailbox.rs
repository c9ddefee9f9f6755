//! Single-slot command mailbox
//!
//! A mailbox holds at most one pending command. `send` overwrites whatever
//! the worker has not consumed yet, so a burst of commands collapses into the
//! most recent one. There is no queue, no acknowledgement and no backpressure:
//! this is a control plane, not a data channel.
//!
//! The same mutex also carries the shutdown flag, which lets the worker's idle
//! sleep be interrupted by a shutdown request without being woken by ordinary
//! sends.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

struct MailboxState<C> {
    pending: Option<C>,
    shutdown: bool,
    sent: u64,
    overwritten: u64,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    /// Commands written by callers
    pub sent: u64,
    /// Commands replaced before the worker consumed them
    pub overwritten: u64,
}

/// Overwrite-on-write command holder shared by callers and one worker
pub struct Mailbox<C> {
    state: Mutex<MailboxState<C>>,
    wake: Condvar,
}

impl<C: fmt::Debug> Mailbox<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                pending: None,
                shutdown: false,
                sent: 0,
                overwritten: 0,
            }),
            wake: Condvar::new(),
        }
    }

    /// Store `command`, replacing any unconsumed one
    pub fn send(&self, command: C) {
        let mut state = self.state.lock();
        state.sent += 1;
        if let Some(dropped) = state.pending.replace(command) {
            state.overwritten += 1;
            tracing::debug!("Mailbox overwrite: {:?} dropped before it was taken", dropped);
        }
    }

    /// Remove and return the pending command (worker side)
    pub fn take(&self) -> Option<C> {
        self.state.lock().pending.take()
    }

    /// Whether a command is waiting
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Flag shutdown and wake the idle worker. Returns false if already flagged.
    pub fn request_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        state.shutdown = true;
        if let Some(dropped) = state.pending.take() {
            tracing::debug!("Shutdown requested, discarding pending {:?}", dropped);
        }
        self.wake.notify_all();
        true
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Sleep for up to `timeout`, returning early only on shutdown.
    ///
    /// Returns true when shutdown has been requested.
    pub fn idle_wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.shutdown {
            if self.wake.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.shutdown
    }

    /// Get delivery counters
    pub fn stats(&self) -> MailboxStats {
        let state = self.state.lock();
        MailboxStats {
            sent: state.sent,
            overwritten: state.overwritten,
        }
    }
}

impl<C: fmt::Debug> Default for Mailbox<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_empty() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        assert_eq!(mailbox.take(), None);
        assert!(!mailbox.has_pending());
    }

    #[test]
    fn test_last_write_wins() {
        let mailbox = Mailbox::new();
        mailbox.send("start");
        mailbox.send("stop");

        assert_eq!(mailbox.take(), Some("stop"));
        assert_eq!(mailbox.take(), None);
        assert_eq!(
            mailbox.stats(),
            MailboxStats {
                sent: 2,
                overwritten: 1
            }
        );
    }

    #[test]
    fn test_shutdown_interrupts_idle_wait() {
        let mailbox: Arc<Mailbox<u32>> = Arc::new(Mailbox::new());
        let waiter = mailbox.clone();

        let start = Instant::now();
        let handle = thread::spawn(move || waiter.idle_wait(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(50));
        assert!(mailbox.request_shutdown());
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));

        // One-way
        assert!(!mailbox.request_shutdown());
        assert!(mailbox.is_shutdown());
    }

    #[test]
    fn test_send_does_not_cut_idle_wait_short() {
        let mailbox: Arc<Mailbox<u32>> = Arc::new(Mailbox::new());
        let waiter = mailbox.clone();

        let start = Instant::now();
        let handle = thread::spawn(move || waiter.idle_wait(Duration::from_millis(200)));
        thread::sleep(Duration::from_millis(20));
        mailbox.send(1);

        assert!(!handle.join().unwrap());
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(mailbox.take(), Some(1));
    }

    #[test]
    fn test_shutdown_discards_pending() {
        let mailbox = Mailbox::new();
        mailbox.send(7u8);
        mailbox.request_shutdown();
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_concurrent_senders_leave_one_command() {
        let mailbox: Arc<Mailbox<(usize, usize)>> = Arc::new(Mailbox::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let mailbox = mailbox.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        mailbox.send((t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (_, last) = mailbox.take().unwrap();
        assert_eq!(last, 249);
        assert_eq!(mailbox.take(), None);

        let stats = mailbox.stats();
        assert_eq!(stats.sent, 1000);
        assert_eq!(stats.overwritten, 999);
    }

    proptest! {
        #[test]
        fn prop_only_last_command_is_observed(commands in proptest::collection::vec(any::<u32>(), 1..64)) {
            let mailbox = Mailbox::new();
            for &c in &commands {
                mailbox.send(c);
            }

            prop_assert_eq!(mailbox.take(), commands.last().copied());
            prop_assert_eq!(mailbox.take(), None);
            prop_assert_eq!(mailbox.stats().overwritten, commands.len() as u64 - 1);
        }
    }
}

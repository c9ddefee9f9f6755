//! Audio backend seam
//!
//! Workers never talk to audio hardware directly. They open, drive and close
//! resources through an [`AudioBackend`], which may block for an arbitrary
//! time. [`SimulatedBackend`] stands in for the device: it applies a fixed
//! latency to every operation and can be told to stall or fail, which is how
//! the daemon and the tests reproduce a hung driver call.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::record::CaptureFormat;
use crate::error::BackendError;

/// What a slot is opening
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenRequest {
    /// File player; `offload` selects the compressed offload path
    Playback { file: String, offload: bool },
    /// PCM capture session
    Capture { format: CaptureFormat },
    /// Loopback VOIP session
    Voip { speaker: bool },
}

impl OpenRequest {
    /// Short form for slot descriptions and log lines
    pub fn describe(&self) -> String {
        match self {
            OpenRequest::Playback { file, offload: true } => format!("offload {}", file),
            OpenRequest::Playback { file, offload: false } => format!("pcm {}", file),
            OpenRequest::Capture { format } => format!("capture {}", format),
            OpenRequest::Voip { speaker: true } => "voip (speaker)".to_string(),
            OpenRequest::Voip { speaker: false } => "voip".to_string(),
        }
    }
}

/// Operation on an open resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum AudioOp {
    Start,
    Pause,
    Resume,
    /// Position as a fraction of the duration, clamped to 0.0..=1.0
    Seek(f32),
    SetMuted(bool),
    SetSpeaker(bool),
}

/// Platform audio stack as seen by a worker
pub trait AudioBackend: Send + 'static {
    /// Open resource
    type Handle: Send + 'static;

    /// Create a resource. May block.
    fn open(&mut self, request: &OpenRequest) -> Result<Self::Handle, BackendError>;

    /// Drive an open resource. May block.
    fn execute(&mut self, handle: &mut Self::Handle, op: AudioOp) -> Result<(), BackendError>;

    /// Release a resource. Errors are swallowed by the backend.
    fn close(&mut self, handle: Self::Handle);
}

/// Journal entry recorded by [`SimulatedBackend`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackendEvent {
    Opened { id: u64, request: OpenRequest },
    Executed { id: u64, op: AudioOp },
    Closed { id: u64 },
}

/// Resource handed out by [`SimulatedBackend`]
#[derive(Debug)]
pub struct SimHandle {
    pub id: u64,
    pub request: OpenRequest,
}

#[derive(Default)]
struct Faults {
    stalls: VecDeque<Duration>,
    open_failures: VecDeque<String>,
    op_failures: VecDeque<String>,
}

struct SimInner {
    op_latency: Duration,
    next_id: AtomicU64,
    faults: Mutex<Faults>,
    events: Mutex<Vec<BackendEvent>>,
}

/// In-process backend with injectable latency, stalls and failures.
///
/// Clones share state, so a test (or the daemon's `stall` command) can keep a
/// clone and inject faults while a worker owns the other.
#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<SimInner>,
}

impl SimulatedBackend {
    pub fn new(op_latency: Duration) -> Self {
        Self {
            inner: Arc::new(SimInner {
                op_latency,
                next_id: AtomicU64::new(1),
                faults: Mutex::new(Faults::default()),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Block the next backend call for `duration`
    pub fn stall_next(&self, duration: Duration) {
        self.inner.faults.lock().stalls.push_back(duration);
    }

    /// Fail the next `open`
    pub fn fail_next_open(&self, msg: impl Into<String>) {
        self.inner.faults.lock().open_failures.push_back(msg.into());
    }

    /// Fail the next `execute`
    pub fn fail_next_op(&self, msg: impl Into<String>) {
        self.inner.faults.lock().op_failures.push_back(msg.into());
    }

    /// Everything that happened so far, in order
    pub fn events(&self) -> Vec<BackendEvent> {
        self.inner.events.lock().clone()
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.inner
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, BackendEvent::Opened { .. }))
            .count()
    }

    /// Ids closed so far, in close order
    pub fn closed_ids(&self) -> Vec<u64> {
        self.inner
            .events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Closed { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn delay(&self) {
        let stall = self.inner.faults.lock().stalls.pop_front();
        if let Some(stall) = stall {
            tracing::warn!("Simulated backend stalling for {:?}", stall);
            thread::sleep(stall);
        }
        if !self.inner.op_latency.is_zero() {
            thread::sleep(self.inner.op_latency);
        }
    }

    fn record(&self, event: BackendEvent) {
        self.inner.events.lock().push(event);
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl AudioBackend for SimulatedBackend {
    type Handle = SimHandle;

    fn open(&mut self, request: &OpenRequest) -> Result<SimHandle, BackendError> {
        self.delay();
        let failure = self.inner.faults.lock().open_failures.pop_front();
        if let Some(msg) = failure {
            return Err(BackendError::new(msg));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.record(BackendEvent::Opened {
            id,
            request: request.clone(),
        });
        Ok(SimHandle {
            id,
            request: request.clone(),
        })
    }

    fn execute(&mut self, handle: &mut SimHandle, op: AudioOp) -> Result<(), BackendError> {
        self.delay();
        let failure = self.inner.faults.lock().op_failures.pop_front();
        if let Some(msg) = failure {
            return Err(BackendError::new(msg));
        }

        self.record(BackendEvent::Executed { id: handle.id, op });
        Ok(())
    }

    fn close(&mut self, handle: SimHandle) {
        self.delay();
        self.record(BackendEvent::Closed { id: handle.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn playback(file: &str) -> OpenRequest {
        OpenRequest::Playback {
            file: file.to_string(),
            offload: false,
        }
    }

    #[test]
    fn test_journal() {
        let mut backend = SimulatedBackend::default();
        let mut handle = backend.open(&playback("a.wav")).unwrap();
        backend.execute(&mut handle, AudioOp::Start).unwrap();
        backend.close(handle);

        assert_eq!(
            backend.events(),
            vec![
                BackendEvent::Opened {
                    id: 1,
                    request: playback("a.wav")
                },
                BackendEvent::Executed {
                    id: 1,
                    op: AudioOp::Start
                },
                BackendEvent::Closed { id: 1 },
            ]
        );
        assert_eq!(backend.open_count(), 1);
        assert_eq!(backend.closed_ids(), vec![1]);
    }

    #[test]
    fn test_injected_failures_are_one_shot() {
        let mut backend = SimulatedBackend::default();
        backend.fail_next_open("device busy");

        assert_eq!(
            backend.open(&playback("a.wav")).unwrap_err(),
            BackendError::new("device busy")
        );
        let mut handle = backend.open(&playback("a.wav")).unwrap();

        backend.fail_next_op("underrun");
        assert!(backend.execute(&mut handle, AudioOp::Start).is_err());
        assert!(backend.execute(&mut handle, AudioOp::Start).is_ok());
    }

    #[test]
    fn test_stall_blocks_one_call() {
        let mut backend = SimulatedBackend::default();
        let injector = backend.clone();
        injector.stall_next(Duration::from_millis(80));

        let start = Instant::now();
        let handle = backend.open(&playback("a.wav")).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(80));

        let start = Instant::now();
        backend.close(handle);
        assert!(start.elapsed() < Duration::from_millis(80));
    }

    #[test]
    fn test_describe() {
        assert_eq!(playback("x.wav").describe(), "pcm x.wav");
        assert_eq!(OpenRequest::Voip { speaker: true }.describe(), "voip (speaker)");
    }
}

//! Audio subsystems
//!
//! Playback, PCM capture and VOIP loopback, each a [`Subsystem`] driven by
//! its own controller, plus the backend seam they all talk through.
//!
//! [`Subsystem`]: crate::controller::Subsystem

pub mod backend;
pub mod playback;
pub mod record;
pub mod voip;

pub use backend::{AudioBackend, AudioOp, BackendEvent, OpenRequest, SimHandle, SimulatedBackend};
pub use playback::{PlaybackCommand, PlaybackController, PlaybackWorker};
pub use record::{CaptureFormat, RecordCommand, RecordController, RecordWorker};
pub use voip::{VoipCommand, VoipController, VoipWorker};

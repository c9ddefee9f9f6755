//! VOIP loopback subsystem
//!
//! One session slot. The speaker preference is kept across sessions: set
//! while idle, it is applied when the next session opens.

use crate::audio::backend::{AudioBackend, AudioOp, OpenRequest};
use crate::constants::{GROUP_VOIP, VOIP_SESSIONS};
use crate::controller::{Controller, SlotTable, SlotsSnapshot, Subsystem};
use crate::error::SlotError;

/// Session slot index
const SESSION: usize = 0;

/// VOIP command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoipCommand {
    Start,
    Stop,
    /// Mute the receive path
    Mute(bool),
    /// Route output to the speakerphone
    SwitchSpeaker(bool),
}

/// VOIP worker state
pub struct VoipWorker<B: AudioBackend> {
    backend: B,
    session: SlotTable<B::Handle>,
    use_speaker: bool,
}

impl<B: AudioBackend> VoipWorker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: SlotTable::new(GROUP_VOIP, VOIP_SESSIONS),
            use_speaker: false,
        }
    }

    /// Speaker preference
    pub fn use_speaker(&self) -> bool {
        self.use_speaker
    }

    fn start(&mut self) -> Result<(), SlotError> {
        self.session.ensure_vacant(SESSION)?;

        let request = OpenRequest::Voip {
            speaker: self.use_speaker,
        };
        tracing::info!("voip start (speaker {})", self.use_speaker);

        let mut handle = self.backend.open(&request).map_err(SlotError::ResourceInit)?;
        if let Err(e) = self.backend.execute(&mut handle, AudioOp::Start) {
            self.backend.close(handle);
            return Err(SlotError::ResourceInit(e));
        }
        self.session.insert(SESSION, handle, request.describe())
    }

    fn stop(&mut self) -> Result<(), SlotError> {
        let handle = self.session.remove(SESSION)?;
        tracing::info!("voip stop");
        self.backend.close(handle);
        Ok(())
    }

    fn mute(&mut self, muted: bool) -> Result<(), SlotError> {
        let handle = self.session.occupied_mut(SESSION)?;
        tracing::debug!("voip mute {}", muted);
        self.backend
            .execute(handle, AudioOp::SetMuted(muted))
            .map_err(SlotError::ResourceRuntime)
    }

    fn switch_speaker(&mut self, on: bool) -> Result<(), SlotError> {
        self.use_speaker = on;
        if !self.session.is_occupied(SESSION) {
            tracing::debug!("voip speaker {} (applied on next start)", on);
            return Ok(());
        }

        let handle = self.session.occupied_mut(SESSION)?;
        tracing::debug!("voip speaker {}", on);
        self.backend
            .execute(handle, AudioOp::SetSpeaker(on))
            .map_err(SlotError::ResourceRuntime)
    }
}

impl<B: AudioBackend> Subsystem for VoipWorker<B> {
    type Command = VoipCommand;

    fn name(&self) -> &str {
        GROUP_VOIP
    }

    fn execute(&mut self, command: VoipCommand) {
        let result = match command {
            VoipCommand::Start => self.start(),
            VoipCommand::Stop => self.stop(),
            VoipCommand::Mute(muted) => self.mute(muted),
            VoipCommand::SwitchSpeaker(on) => self.switch_speaker(on),
        };
        if let Err(e) = result {
            self.session.record_error(SESSION, e);
        }
    }

    fn teardown(&mut self) {
        if let Ok(handle) = self.session.remove(SESSION) {
            tracing::debug!("voip session released");
            self.backend.close(handle);
        }
    }

    fn snapshot(&self) -> SlotsSnapshot {
        self.session.snapshot()
    }
}

/// VOIP controller
pub type VoipController<B> = Controller<VoipWorker<B>>;

impl<B: AudioBackend> Controller<VoipWorker<B>> {
    pub fn start(&self) {
        self.send(VoipCommand::Start);
    }

    pub fn stop(&self) {
        self.send(VoipCommand::Stop);
    }

    pub fn mute(&self, muted: bool) {
        self.send(VoipCommand::Mute(muted));
    }

    pub fn switch_speaker(&self, on: bool) {
        self.send(VoipCommand::SwitchSpeaker(on));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{BackendEvent, SimulatedBackend};

    #[test]
    fn test_speaker_preference_applied_on_start() {
        let backend = SimulatedBackend::default();
        let mut worker = VoipWorker::new(backend.clone());

        worker.execute(VoipCommand::SwitchSpeaker(true));
        assert!(backend.events().is_empty());
        assert!(worker.use_speaker());

        worker.execute(VoipCommand::Start);
        assert_eq!(
            backend.events()[0],
            BackendEvent::Opened {
                id: 1,
                request: OpenRequest::Voip { speaker: true }
            }
        );
        assert_eq!(worker.session.last_error(SESSION), None);
    }

    #[test]
    fn test_speaker_switch_during_session() {
        let backend = SimulatedBackend::default();
        let mut worker = VoipWorker::new(backend.clone());
        worker.execute(VoipCommand::Start);
        worker.execute(VoipCommand::SwitchSpeaker(true));

        assert_eq!(
            backend.events().last(),
            Some(&BackendEvent::Executed {
                id: 1,
                op: AudioOp::SetSpeaker(true)
            })
        );
    }

    #[test]
    fn test_mute_requires_session() {
        let backend = SimulatedBackend::default();
        let mut worker = VoipWorker::new(backend.clone());
        worker.execute(VoipCommand::Mute(true));
        assert_eq!(
            worker.session.last_error(SESSION),
            Some(&SlotError::SlotEmpty(0))
        );

        worker.execute(VoipCommand::Start);
        worker.execute(VoipCommand::Mute(true));
        assert_eq!(
            backend.events().last(),
            Some(&BackendEvent::Executed {
                id: 1,
                op: AudioOp::SetMuted(true)
            })
        );
    }

    #[test]
    fn test_single_session() {
        let backend = SimulatedBackend::default();
        let mut worker = VoipWorker::new(backend.clone());
        worker.execute(VoipCommand::Start);
        worker.execute(VoipCommand::Start);

        assert_eq!(backend.open_count(), 1);
        assert_eq!(
            worker.session.last_error(SESSION),
            Some(&SlotError::SlotBusy(0))
        );

        worker.teardown();
        assert_eq!(backend.closed_ids(), vec![1]);
        assert_eq!(worker.snapshot().occupied_count(), 0);
    }
}

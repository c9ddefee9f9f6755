//! File playback subsystem
//!
//! Up to [`MAX_PLAYERS`](crate::constants::MAX_PLAYERS) concurrent players,
//! each in its own slot. A player is opened in either PCM or offload mode;
//! only one slot is remembered as the offload player at a time.

use crate::audio::backend::{AudioBackend, AudioOp, OpenRequest};
use crate::config::PlaybackConfig;
use crate::constants::GROUP_PLAYBACK;
use crate::controller::{Controller, SlotTable, SlotsSnapshot, Subsystem};
use crate::error::SlotError;

/// Playback command
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Open and start a player. `file` falls back to the configured default.
    Start {
        slot: usize,
        offload: bool,
        file: Option<String>,
    },
    Stop {
        slot: usize,
    },
    /// Jump to `fraction` of the duration. Skipped while paused.
    Seek {
        slot: usize,
        fraction: f32,
    },
    /// Toggle between paused and playing
    PauseResume {
        slot: usize,
    },
}

impl PlaybackCommand {
    pub fn slot(&self) -> usize {
        match self {
            PlaybackCommand::Start { slot, .. }
            | PlaybackCommand::Stop { slot }
            | PlaybackCommand::Seek { slot, .. }
            | PlaybackCommand::PauseResume { slot } => *slot,
        }
    }
}

/// An open player
pub struct Player<H> {
    handle: H,
    offload: bool,
    paused: bool,
}

/// Playback worker state
pub struct PlaybackWorker<B: AudioBackend> {
    backend: B,
    players: SlotTable<Player<B::Handle>>,
    default_file: String,
    /// Slot currently holding the offload player
    offload_slot: Option<usize>,
}

impl<B: AudioBackend> PlaybackWorker<B> {
    pub fn new(backend: B, config: &PlaybackConfig) -> Self {
        Self {
            backend,
            players: SlotTable::new(GROUP_PLAYBACK, config.max_players),
            default_file: config.default_file.clone(),
            offload_slot: None,
        }
    }

    /// Slot currently holding the offload player
    pub fn offload_slot(&self) -> Option<usize> {
        self.offload_slot
    }

    fn start(&mut self, slot: usize, offload: bool, file: Option<String>) -> Result<(), SlotError> {
        self.players.ensure_vacant(slot)?;

        let request = OpenRequest::Playback {
            file: file.unwrap_or_else(|| self.default_file.clone()),
            offload,
        };
        tracing::info!("playback idx {} {}", slot, request.describe());

        let mut handle = self.backend.open(&request).map_err(SlotError::ResourceInit)?;
        if let Err(e) = self.backend.execute(&mut handle, AudioOp::Start) {
            self.backend.close(handle);
            return Err(SlotError::ResourceInit(e));
        }

        let player = Player {
            handle,
            offload,
            paused: false,
        };
        self.players.insert(slot, player, request.describe())?;

        if offload {
            if let Some(previous) = self.offload_slot.replace(slot) {
                tracing::debug!("offload player moved from slot {} to {}", previous, slot);
            }
        }
        Ok(())
    }

    fn stop(&mut self, slot: usize) -> Result<(), SlotError> {
        let player = self.players.remove(slot)?;
        tracing::info!("playback idx {} stop", slot);
        self.backend.close(player.handle);

        if self.offload_slot == Some(slot) {
            self.offload_slot = None;
        }
        Ok(())
    }

    fn seek(&mut self, slot: usize, fraction: f32) -> Result<(), SlotError> {
        let player = self.players.occupied_mut(slot)?;
        if player.paused {
            tracing::debug!("playback idx {} paused, seek skipped", slot);
            return Ok(());
        }

        let fraction = fraction.clamp(0.0, 1.0);
        tracing::debug!("playback idx {} seek to {:.0}%", slot, fraction * 100.0);
        self.backend
            .execute(&mut player.handle, AudioOp::Seek(fraction))
            .map_err(SlotError::ResourceRuntime)
    }

    fn pause_resume(&mut self, slot: usize) -> Result<(), SlotError> {
        let player = self.players.occupied_mut(slot)?;
        let op = if player.paused {
            AudioOp::Resume
        } else {
            AudioOp::Pause
        };

        self.backend
            .execute(&mut player.handle, op)
            .map_err(SlotError::ResourceRuntime)?;
        player.paused = !player.paused;
        tracing::debug!("playback idx {} {:?}", slot, op);
        Ok(())
    }
}

impl<B: AudioBackend> Subsystem for PlaybackWorker<B> {
    type Command = PlaybackCommand;

    fn name(&self) -> &str {
        GROUP_PLAYBACK
    }

    fn execute(&mut self, command: PlaybackCommand) {
        let slot = command.slot();
        let result = match command {
            PlaybackCommand::Start {
                slot,
                offload,
                file,
            } => self.start(slot, offload, file),
            PlaybackCommand::Stop { slot } => self.stop(slot),
            PlaybackCommand::Seek { slot, fraction } => self.seek(slot, fraction),
            PlaybackCommand::PauseResume { slot } => self.pause_resume(slot),
        };

        if let Err(e) = result {
            self.players.record_error(slot, e);
        }
    }

    fn teardown(&mut self) {
        for slot in self.players.occupied_indices() {
            if let Ok(player) = self.players.remove(slot) {
                tracing::debug!(
                    "playback idx {} released{}",
                    slot,
                    if player.offload { " (offload)" } else { "" }
                );
                self.backend.close(player.handle);
            }
        }
        self.offload_slot = None;
    }

    fn snapshot(&self) -> SlotsSnapshot {
        self.players.snapshot()
    }
}

/// Playback controller
pub type PlaybackController<B> = Controller<PlaybackWorker<B>>;

impl<B: AudioBackend> Controller<PlaybackWorker<B>> {
    /// Start the default file in `slot`
    pub fn start(&self, slot: usize, offload: bool) {
        self.send(PlaybackCommand::Start {
            slot,
            offload,
            file: None,
        });
    }

    /// Start a specific file in `slot`
    pub fn start_file(&self, slot: usize, offload: bool, file: impl Into<String>) {
        self.send(PlaybackCommand::Start {
            slot,
            offload,
            file: Some(file.into()),
        });
    }

    pub fn stop(&self, slot: usize) {
        self.send(PlaybackCommand::Stop { slot });
    }

    pub fn seek(&self, slot: usize, fraction: f32) {
        self.send(PlaybackCommand::Seek { slot, fraction });
    }

    pub fn pause_resume(&self, slot: usize) {
        self.send(PlaybackCommand::PauseResume { slot });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{BackendEvent, SimulatedBackend};
    use crate::error::BackendError;

    fn worker() -> (PlaybackWorker<SimulatedBackend>, SimulatedBackend) {
        let backend = SimulatedBackend::default();
        (
            PlaybackWorker::new(backend.clone(), &PlaybackConfig::default()),
            backend,
        )
    }

    fn start(slot: usize, offload: bool) -> PlaybackCommand {
        PlaybackCommand::Start {
            slot,
            offload,
            file: None,
        }
    }

    #[test]
    fn test_start_uses_default_file() {
        let (mut worker, backend) = worker();
        worker.execute(start(0, false));

        assert_eq!(
            backend.events(),
            vec![
                BackendEvent::Opened {
                    id: 1,
                    request: OpenRequest::Playback {
                        file: "test.wav".into(),
                        offload: false
                    }
                },
                BackendEvent::Executed {
                    id: 1,
                    op: AudioOp::Start
                },
            ]
        );
        let snapshot = worker.snapshot();
        assert!(snapshot.slot(0).unwrap().occupied);
        assert_eq!(
            snapshot.slot(0).unwrap().description.as_deref(),
            Some("pcm test.wav")
        );
    }

    #[test]
    fn test_busy_and_invalid_slots_are_noops() {
        let (mut worker, backend) = worker();
        worker.execute(start(1, false));
        worker.execute(start(1, true));
        worker.execute(start(4, false));

        assert_eq!(backend.open_count(), 1);
        let snapshot = worker.snapshot();
        assert_eq!(
            snapshot.slot(1).unwrap().last_error,
            Some(SlotError::SlotBusy(1))
        );
        assert_eq!(
            snapshot.last_rejected,
            Some(SlotError::InvalidIndex {
                index: 4,
                capacity: 4
            })
        );
    }

    #[test]
    fn test_stop_empty_slot() {
        let (mut worker, backend) = worker();
        worker.execute(PlaybackCommand::Stop { slot: 2 });

        assert!(backend.events().is_empty());
        assert_eq!(worker.players.last_error(2), Some(&SlotError::SlotEmpty(2)));
    }

    #[test]
    fn test_open_failure_leaves_slot_empty() {
        let (mut worker, backend) = worker();
        backend.fail_next_open("file not found");
        worker.execute(start(0, false));

        let status = worker.snapshot().slots[0].clone();
        assert!(!status.occupied);
        assert_eq!(
            status.last_error,
            Some(SlotError::ResourceInit(BackendError::new("file not found")))
        );

        // The slot is usable again
        worker.execute(start(0, false));
        assert!(worker.snapshot().slots[0].occupied);
    }

    #[test]
    fn test_offload_slot_tracking() {
        let (mut worker, _) = worker();
        worker.execute(start(0, true));
        assert_eq!(worker.offload_slot(), Some(0));

        worker.execute(start(2, true));
        assert_eq!(worker.offload_slot(), Some(2));

        worker.execute(PlaybackCommand::Stop { slot: 0 });
        assert_eq!(worker.offload_slot(), Some(2));

        worker.execute(PlaybackCommand::Stop { slot: 2 });
        assert_eq!(worker.offload_slot(), None);
    }

    #[test]
    fn test_pause_resume_and_seek() {
        let (mut worker, backend) = worker();
        worker.execute(start(0, false));
        worker.execute(PlaybackCommand::Seek {
            slot: 0,
            fraction: 1.7,
        });
        worker.execute(PlaybackCommand::PauseResume { slot: 0 });
        worker.execute(PlaybackCommand::Seek {
            slot: 0,
            fraction: 0.5,
        });
        worker.execute(PlaybackCommand::PauseResume { slot: 0 });

        let ops: Vec<AudioOp> = backend
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Executed { op, .. } => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                AudioOp::Start,
                AudioOp::Seek(1.0),
                AudioOp::Pause,
                AudioOp::Resume
            ]
        );
    }

    #[test]
    fn test_seek_empty_slot() {
        let (mut worker, backend) = worker();
        worker.execute(PlaybackCommand::Seek {
            slot: 3,
            fraction: 0.5,
        });
        assert_eq!(backend.open_count(), 0);
        assert_eq!(worker.players.last_error(3), Some(&SlotError::SlotEmpty(3)));
    }

    #[test]
    fn test_runtime_failure_keeps_player() {
        let (mut worker, backend) = worker();
        worker.execute(start(0, false));
        backend.fail_next_op("dead object");
        worker.execute(PlaybackCommand::PauseResume { slot: 0 });

        let status = worker.snapshot().slots[0].clone();
        assert!(status.occupied);
        assert!(status.last_error.unwrap().is_resource_failure());
    }

    #[test]
    fn test_teardown_closes_in_index_order() {
        let (mut worker, backend) = worker();
        worker.execute(start(3, false));
        worker.execute(start(0, true));
        worker.execute(start(1, false));

        // Opened as ids 1, 2, 3 into slots 3, 0, 1
        worker.teardown();
        assert_eq!(backend.closed_ids(), vec![2, 3, 1]);
        assert_eq!(worker.snapshot().occupied_count(), 0);
        assert_eq!(worker.offload_slot(), None);
    }
}

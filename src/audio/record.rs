//! PCM capture subsystem

use serde::Serialize;
use std::fmt;

use crate::audio::backend::{AudioBackend, AudioOp, OpenRequest};
use crate::config::RecordConfig;
use crate::constants::GROUP_RECORD;
use crate::controller::{Controller, SlotTable, SlotsSnapshot, Subsystem};
use crate::error::SlotError;

/// Capture sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFormat {
    /// 16-bit PCM
    Pcm16,
    /// High-definition (24-bit) PCM
    PcmHd,
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFormat::Pcm16 => write!(f, "pcm16"),
            CaptureFormat::PcmHd => write!(f, "pcm24"),
        }
    }
}

/// Record command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCommand {
    Start { slot: usize, format: CaptureFormat },
    Stop { slot: usize },
}

impl RecordCommand {
    pub fn slot(&self) -> usize {
        match self {
            RecordCommand::Start { slot, .. } | RecordCommand::Stop { slot } => *slot,
        }
    }
}

/// Record worker state
pub struct RecordWorker<B: AudioBackend> {
    backend: B,
    recorders: SlotTable<B::Handle>,
}

impl<B: AudioBackend> RecordWorker<B> {
    pub fn new(backend: B, config: &RecordConfig) -> Self {
        Self {
            backend,
            recorders: SlotTable::new(GROUP_RECORD, config.max_recorders),
        }
    }

    fn start(&mut self, slot: usize, format: CaptureFormat) -> Result<(), SlotError> {
        self.recorders.ensure_vacant(slot)?;

        let request = OpenRequest::Capture { format };
        tracing::info!("record idx {} start {}", slot, format);

        let mut handle = self.backend.open(&request).map_err(SlotError::ResourceInit)?;
        if let Err(e) = self.backend.execute(&mut handle, AudioOp::Start) {
            self.backend.close(handle);
            return Err(SlotError::ResourceInit(e));
        }
        self.recorders.insert(slot, handle, request.describe())
    }

    fn stop(&mut self, slot: usize) -> Result<(), SlotError> {
        let handle = self.recorders.remove(slot)?;
        tracing::info!("record idx {} stop", slot);
        self.backend.close(handle);
        Ok(())
    }
}

impl<B: AudioBackend> Subsystem for RecordWorker<B> {
    type Command = RecordCommand;

    fn name(&self) -> &str {
        GROUP_RECORD
    }

    fn execute(&mut self, command: RecordCommand) {
        let result = match command {
            RecordCommand::Start { slot, format } => self.start(slot, format),
            RecordCommand::Stop { slot } => self.stop(slot),
        };
        if let Err(e) = result {
            self.recorders.record_error(command.slot(), e);
        }
    }

    fn teardown(&mut self) {
        for slot in self.recorders.occupied_indices() {
            if let Ok(handle) = self.recorders.remove(slot) {
                tracing::debug!("record idx {} released", slot);
                self.backend.close(handle);
            }
        }
    }

    fn snapshot(&self) -> SlotsSnapshot {
        self.recorders.snapshot()
    }
}

/// Record controller
pub type RecordController<B> = Controller<RecordWorker<B>>;

impl<B: AudioBackend> Controller<RecordWorker<B>> {
    pub fn start(&self, slot: usize, format: CaptureFormat) {
        self.send(RecordCommand::Start { slot, format });
    }

    pub fn stop(&self, slot: usize) {
        self.send(RecordCommand::Stop { slot });
    }
}

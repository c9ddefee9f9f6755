//! Indexed resource slots owned by a worker
//!
//! A slot is either empty or holds exactly one active backend resource.
//! Starting on an occupied slot or stopping an empty one is rejected with a
//! logged [`SlotError`], never a crash. The most recent failure is kept on
//! the slot so it can be queried later.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SlotError;

/// One resource slot
struct Slot<R> {
    resource: Option<R>,
    description: Option<String>,
    last_error: Option<SlotError>,
    updated_at: DateTime<Utc>,
}

impl<R> Slot<R> {
    fn empty() -> Self {
        Self {
            resource: None,
            description: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Reportable state of one slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub index: usize,
    pub occupied: bool,
    pub description: Option<String>,
    pub last_error: Option<SlotError>,
    pub updated_at: DateTime<Utc>,
}

/// All slots of one worker, plus the last command rejected before it could
/// address a slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlotsSnapshot {
    pub slots: Vec<SlotStatus>,
    pub last_rejected: Option<SlotError>,
}

impl SlotsSnapshot {
    /// Get status of a slot
    pub fn slot(&self, index: usize) -> Option<&SlotStatus> {
        self.slots.get(index)
    }

    /// Number of occupied slots
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }
}

/// Fixed-capacity table of resource slots
pub struct SlotTable<R> {
    /// Owner name used in log lines
    owner: String,
    slots: Vec<Slot<R>>,
    last_rejected: Option<SlotError>,
}

impl<R> SlotTable<R> {
    pub fn new(owner: impl Into<String>, capacity: usize) -> Self {
        Self {
            owner: owner.into(),
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            last_rejected: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Validate a slot index
    pub fn check_index(&self, index: usize) -> Result<(), SlotError> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(SlotError::InvalidIndex {
                index,
                capacity: self.slots.len(),
            })
        }
    }

    /// Check if a slot holds a resource
    pub fn is_occupied(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|s| s.resource.is_some())
            .unwrap_or(false)
    }

    /// Require an empty slot (before opening a resource)
    pub fn ensure_vacant(&self, index: usize) -> Result<(), SlotError> {
        self.check_index(index)?;
        if self.is_occupied(index) {
            return Err(SlotError::SlotBusy(index));
        }
        Ok(())
    }

    /// Borrow the resource of an occupied slot
    pub fn occupied_mut(&mut self, index: usize) -> Result<&mut R, SlotError> {
        self.check_index(index)?;
        self.slots[index]
            .resource
            .as_mut()
            .ok_or(SlotError::SlotEmpty(index))
    }

    /// Place a resource into a vacant slot
    pub fn insert(
        &mut self,
        index: usize,
        resource: R,
        description: impl Into<String>,
    ) -> Result<(), SlotError> {
        self.ensure_vacant(index)?;
        let slot = &mut self.slots[index];
        slot.resource = Some(resource);
        slot.description = Some(description.into());
        slot.updated_at = Utc::now();
        Ok(())
    }

    /// Take the resource out of an occupied slot
    pub fn remove(&mut self, index: usize) -> Result<R, SlotError> {
        self.check_index(index)?;
        let slot = &mut self.slots[index];
        let resource = slot.resource.take().ok_or(SlotError::SlotEmpty(index))?;
        slot.description = None;
        slot.updated_at = Utc::now();
        Ok(resource)
    }

    /// Occupied slot indices, ascending
    pub fn occupied_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.resource.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// Record and log a failed command for `index`
    pub fn record_error(&mut self, index: usize, error: SlotError) {
        match &error {
            SlotError::InvalidIndex { .. } => {
                tracing::warn!("{}: rejected command: {}", self.owner, error);
            }
            e if e.is_conflict() => {
                tracing::warn!("{}: slot {} skipped: {}", self.owner, index, error);
            }
            _ => {
                tracing::error!("{}: slot {} error: {}", self.owner, index, error);
            }
        }

        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.last_error = Some(error);
                slot.updated_at = Utc::now();
            }
            None => self.last_rejected = Some(error),
        }
    }

    /// Most recent failure recorded on a slot
    pub fn last_error(&self, index: usize) -> Option<&SlotError> {
        self.slots.get(index).and_then(|s| s.last_error.as_ref())
    }

    /// Build a reportable snapshot
    pub fn snapshot(&self) -> SlotsSnapshot {
        SlotsSnapshot {
            slots: self
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| SlotStatus {
                    index,
                    occupied: slot.resource.is_some(),
                    description: slot.description.clone(),
                    last_error: slot.last_error.clone(),
                    updated_at: slot.updated_at,
                })
                .collect(),
            last_rejected: self.last_rejected.clone(),
        }
    }
}

use std::fmt;

use crate::device::FenceValue;

/// Index of a pipeline slot, `0..slot_count`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SlotIndex(pub(crate) usize);

impl SlotIndex {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a slot.
///
/// `Submitted` and `Idle` are not stored: they are derived by comparing the
/// slot's last submitted value with the GPU's completed value.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

/// One round-robin execution context.
#[derive(Debug, Clone)]
pub struct PipelineSlot {
    index: SlotIndex,
    last_submitted: Option<FenceValue>,
    recording: bool,
}

impl PipelineSlot {
    pub(crate) fn new(index: SlotIndex) -> Self {
        Self {
            index,
            last_submitted: None,
            recording: false,
        }
    }

    pub fn index(&self) -> SlotIndex {
        self.index
    }

    /// Fence value of the slot's most recent submission.
    pub fn last_submitted(&self) -> Option<FenceValue> {
        self.last_submitted
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn state(&self, completed: FenceValue) -> SlotState {
        if self.recording {
            return SlotState::Recording;
        }
        match self.last_submitted {
            Some(v) if v > completed => SlotState::Submitted,
            _ => SlotState::Idle,
        }
    }

    pub(crate) fn start_recording(&mut self) {
        self.recording = true;
    }

    pub(crate) fn finish_submission(&mut self, value: FenceValue) {
        self.recording = false;
        self.last_submitted = Some(value);
    }

    pub(crate) fn abandon_recording(&mut self) {
        self.recording = false;
    }
}

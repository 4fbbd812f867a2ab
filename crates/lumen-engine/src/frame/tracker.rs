use crate::device::{DeviceContext, FenceValue, GpuBackend, GpuError, GpuResult};

use super::slot::{PipelineSlot, SlotIndex, SlotState};

/// Proof that a slot's previous submission has completed on the GPU.
///
/// Produced only by [`FrameFenceTracker::begin_slot`]; the command recorder
/// requires one to reset the slot's allocator.
#[derive(Debug)]
pub struct SlotReady {
    slot: SlotIndex,
    awaited: Option<FenceValue>,
    completed: FenceValue,
}

impl SlotReady {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Fence value that was gate-waited, if the slot had been used before.
    pub fn awaited(&self) -> Option<FenceValue> {
        self.awaited
    }

    /// GPU completed value observed after the gate.
    pub fn completed(&self) -> FenceValue {
        self.completed
    }
}

/// Per-slot fence bookkeeping for frames in flight.
///
/// Slots are used round-robin. Entering a slot blocks only if the GPU has not
/// yet reached the fence value recorded for that slot's previous use.
#[derive(Debug)]
pub struct FrameFenceTracker {
    slots: Box<[PipelineSlot]>,
    current: usize,
}

impl FrameFenceTracker {
    pub fn new(slot_count: usize) -> GpuResult<Self> {
        if slot_count == 0 {
            return Err(GpuError::init("at least one pipeline slot is required"));
        }
        let slots = (0..slot_count)
            .map(|i| PipelineSlot::new(SlotIndex(i)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self { slots, current: 0 })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot the next frame will use.
    pub fn current(&self) -> SlotIndex {
        SlotIndex(self.current)
    }

    pub fn slot(&self, index: SlotIndex) -> GpuResult<&PipelineSlot> {
        self.slots
            .get(index.0)
            .ok_or_else(|| GpuError::precondition(format!("slot {index} out of range")))
    }

    pub fn slots(&self) -> &[PipelineSlot] {
        &self.slots
    }

    pub fn state(&self, index: SlotIndex, completed: FenceValue) -> GpuResult<SlotState> {
        Ok(self.slot(index)?.state(completed))
    }

    /// Gate-waits the current slot and marks it recording (Idle -> Recording).
    pub fn begin_slot<B: GpuBackend>(
        &mut self,
        device: &mut DeviceContext<B>,
    ) -> GpuResult<SlotReady> {
        if let Some(busy) = self.slots.iter().find(|s| s.is_recording()) {
            return Err(GpuError::precondition(format!(
                "slot {} is still recording",
                busy.index()
            )));
        }

        let slot = &mut self.slots[self.current];
        let awaited = slot.last_submitted();
        if let Some(value) = awaited {
            device.wait_for_fence_value(value)?;
        }

        let completed = device.completed_value()?;
        if let Some(value) = awaited {
            if completed < value {
                return Err(GpuError::FenceWait {
                    value,
                    reason: format!("gate passed with timeline at {completed}"),
                });
            }
        }

        slot.start_recording();
        Ok(SlotReady {
            slot: slot.index(),
            awaited,
            completed,
        })
    }

    /// Records the fence value guarding the slot's submission (Recording -> Submitted).
    pub fn mark_submitted(&mut self, index: SlotIndex, value: FenceValue) -> GpuResult<()> {
        let newest = self.slots.iter().filter_map(PipelineSlot::last_submitted).max();
        if newest.is_some_and(|n| value <= n) {
            return Err(GpuError::precondition(format!(
                "fence value {value} does not follow previous submissions"
            )));
        }

        let slot = self
            .slots
            .get_mut(index.0)
            .ok_or_else(|| GpuError::precondition(format!("slot {index} out of range")))?;
        if !slot.is_recording() {
            return Err(GpuError::precondition(format!(
                "slot {index} submitted without recording"
            )));
        }
        slot.finish_submission(value);
        Ok(())
    }

    /// Releases a recording slot whose frame was never submitted.
    pub fn abandon(&mut self, index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(index.0) {
            slot.abandon_recording();
        }
    }

    /// Moves to the next slot and returns it.
    pub fn advance(&mut self) -> SlotIndex {
        self.current = (self.current + 1) % self.slots.len();
        SlotIndex(self.current)
    }

    /// Highest fence value recorded across slots.
    pub fn newest_submission(&self) -> Option<FenceValue> {
        self.slots.iter().filter_map(PipelineSlot::last_submitted).max()
    }
}

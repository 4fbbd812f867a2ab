use std::mem;
use std::ops::Range;

use crate::descriptor::DescriptorIndex;
use crate::device::{DeviceContext, GpuBackend, GpuError, GpuResult, KernelId, PipelineId};
use crate::frame::{SlotIndex, SlotReady};
use crate::resource::Barrier;

use super::list::{Command, CommandBuffer};

/// Backing storage for one slot's recordings.
#[derive(Debug, Default)]
struct CommandAllocator {
    storage: Vec<Command>,
    resets: u64,
}

/// One allocator per pipeline slot; drives the reset-record-close cycle.
#[derive(Debug)]
pub struct CommandRecorder {
    allocators: Box<[CommandAllocator]>,
}

impl CommandRecorder {
    pub fn new(slot_count: usize) -> Self {
        let allocators = (0..slot_count)
            .map(|_| CommandAllocator::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { allocators }
    }

    /// Resets the slot's allocator and opens a recording bound to it.
    ///
    /// `ready` proves the slot passed its gate-wait; the backend allocator is
    /// reset before any command is appended.
    pub fn begin_frame<B: GpuBackend>(
        &mut self,
        ready: SlotReady,
        frame: u64,
        device: &mut DeviceContext<B>,
    ) -> GpuResult<Recording<'_>> {
        let slot = ready.slot();
        let allocator = self
            .allocators
            .get_mut(slot.get())
            .ok_or_else(|| GpuError::precondition(format!("no allocator for slot {slot}")))?;

        device.reset_allocator(slot)?;
        allocator.resets += 1;

        let mut commands = mem::take(&mut allocator.storage);
        commands.clear();
        log::trace!("slot {slot}: allocator reset for frame {frame}");

        Ok(Recording {
            allocator,
            slot,
            frame,
            commands: Some(commands),
        })
    }

    /// Hands a submitted buffer's storage back to its slot for reuse.
    pub fn retire(&mut self, buffer: CommandBuffer) {
        if let Some(allocator) = self.allocators.get_mut(buffer.slot.get()) {
            if allocator.storage.capacity() < buffer.commands.capacity() {
                allocator.storage = buffer.commands;
                allocator.storage.clear();
            }
        }
    }

    /// How many times the slot's allocator has been reset.
    pub fn resets(&self, slot: SlotIndex) -> u64 {
        self.allocators.get(slot.get()).map_or(0, |a| a.resets)
    }

    pub fn len(&self) -> usize {
        self.allocators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }
}

/// An open recording. Commands are kept in append order.
///
/// Dropping a recording without [`end_frame`](Self::end_frame) discards its
/// commands and returns the storage to the slot.
#[derive(Debug)]
pub struct Recording<'r> {
    allocator: &'r mut CommandAllocator,
    slot: SlotIndex,
    frame: u64,
    commands: Option<Vec<Command>>,
}

impl Recording<'_> {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.commands.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, command: Command) {
        if let Some(commands) = self.commands.as_mut() {
            commands.push(command);
        }
    }

    /// Records a barrier batch. Empty batches record nothing.
    pub fn barriers(&mut self, barriers: Vec<Barrier>) {
        if barriers.is_empty() {
            return;
        }
        for b in &barriers {
            log::trace!("slot {}: barrier {b}", self.slot);
        }
        self.push(Command::Barriers(barriers));
    }

    /// Records a single transition, if one was needed.
    pub fn barrier(&mut self, barrier: Option<Barrier>) {
        if let Some(b) = barrier {
            self.barriers(vec![b]);
        }
    }

    pub fn clear_render_target(&mut self, view: DescriptorIndex, color: [f32; 4]) {
        self.push(Command::ClearRenderTarget { view, color });
    }

    pub fn bind_kernel(&mut self, kernel: KernelId) {
        self.push(Command::BindKernel(kernel));
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineId) {
        self.push(Command::BindPipeline(pipeline));
    }

    pub fn bind_table(&mut self, binding: u32, descriptor: DescriptorIndex) {
        self.push(Command::BindTable {
            binding,
            descriptor,
        });
    }

    pub fn dispatch(&mut self, groups: [u32; 3]) {
        self.push(Command::Dispatch { groups });
    }

    pub fn draw(&mut self, target: DescriptorIndex, vertices: Range<u32>, instances: Range<u32>) {
        self.push(Command::Draw {
            target,
            vertices,
            instances,
        });
    }

    pub fn copy_image(&mut self, source: DescriptorIndex, destination: DescriptorIndex) {
        self.push(Command::CopyImage {
            source,
            destination,
        });
    }

    /// Closes the recording and returns it for submission.
    pub fn end_frame(mut self) -> CommandBuffer {
        CommandBuffer {
            slot: self.slot,
            frame: self.frame,
            commands: self.commands.take().unwrap_or_default(),
        }
    }
}

impl Drop for Recording<'_> {
    fn drop(&mut self) {
        if let Some(mut commands) = self.commands.take() {
            log::debug!(
                "slot {}: frame {} recording abandoned with {} command(s)",
                self.slot,
                self.frame,
                commands.len()
            );
            commands.clear();
            self.allocator.storage = commands;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{SimEvent, SimulatedGpu};
    use crate::descriptor::{COMPUTE_OUTPUT_VIEW, swapchain_view};
    use crate::device::Extent;
    use crate::frame::FrameFenceTracker;

    fn setup(slots: usize, lag: u64) -> (DeviceContext<SimulatedGpu>, FrameFenceTracker, CommandRecorder) {
        (
            DeviceContext::new(SimulatedGpu::with_lag(Extent::new(16, 16), lag)),
            FrameFenceTracker::new(slots).unwrap(),
            CommandRecorder::new(slots),
        )
    }

    #[test]
    fn commands_keep_recording_order() {
        let (mut device, mut tracker, mut recorder) = setup(2, 0);
        let ready = tracker.begin_slot(&mut device).unwrap();
        let mut rec = recorder.begin_frame(ready, 0, &mut device).unwrap();
        rec.bind_kernel(KernelId::from_raw(0));
        rec.dispatch([2, 2, 1]);
        rec.copy_image(COMPUTE_OUTPUT_VIEW, swapchain_view(0));
        let buffer = rec.end_frame();

        let names: Vec<_> = buffer.commands().iter().map(Command::name).collect();
        assert_eq!(names, ["bind-kernel", "dispatch", "copy"]);
        assert_eq!(buffer.slot(), SlotIndex::new(0));
    }

    #[test]
    fn empty_barrier_batches_are_not_recorded() {
        let (mut device, mut tracker, mut recorder) = setup(1, 0);
        let ready = tracker.begin_slot(&mut device).unwrap();
        let mut rec = recorder.begin_frame(ready, 0, &mut device).unwrap();
        rec.barriers(Vec::new());
        rec.barrier(None);
        assert!(rec.is_empty());
    }

    #[test]
    fn reset_reaches_backend_after_gate_wait() {
        let (mut device, mut tracker, mut recorder) = setup(1, 3);
        for frame in 0..2 {
            let ready = tracker.begin_slot(&mut device).unwrap();
            let buffer = recorder.begin_frame(ready, frame, &mut device).unwrap().end_frame();
            device.submit(std::slice::from_ref(&buffer)).unwrap();
            let value = device.signal_fence().unwrap();
            tracker.mark_submitted(buffer.slot(), value).unwrap();
            recorder.retire(buffer);
            tracker.advance();
        }

        let events = device.backend().events();
        let wait = events
            .iter()
            .position(|e| *e == SimEvent::Wait { value: crate::device::FenceValue::new(1) })
            .unwrap();
        let second_reset = events
            .iter()
            .rposition(|e| matches!(e, SimEvent::Reset { .. }))
            .unwrap();
        assert!(wait < second_reset);
        assert_eq!(recorder.resets(SlotIndex::new(0)), 2);
    }

    #[test]
    fn abandoned_recording_returns_storage() {
        let (mut device, mut tracker, mut recorder) = setup(1, 0);
        let ready = tracker.begin_slot(&mut device).unwrap();
        {
            let mut rec = recorder.begin_frame(ready, 0, &mut device).unwrap();
            rec.dispatch([1, 1, 1]);
        }
        tracker.abandon(SlotIndex::new(0));

        let ready = tracker.begin_slot(&mut device).unwrap();
        let rec = recorder.begin_frame(ready, 1, &mut device).unwrap();
        assert!(rec.is_empty());
    }
}

//! Deterministic GPU timeline for tests and headless runs.
//!
//! Completion lags behind signaling by a fixed number of frames. Every call
//! is appended to an event log, and the simulator independently checks the
//! rules a real driver would punish: allocator reuse while in flight, barriers
//! that start from the wrong state, presenting a non-presentable image.

use std::collections::BTreeMap;

use crate::command::{Command, CommandBuffer};
use crate::descriptor::{DescriptorDirectory, DescriptorIndex};
use crate::device::{
    Extent, FenceValue, GpuBackend, GpuError, GpuResult, ImageDesc, ImageRole, KernelDesc,
    KernelId, PipelineId, RasterPipelineDesc, UniformBufferDesc,
};
use crate::frame::SlotIndex;
use crate::resource::{ResourceId, ResourceState};

/// One observable backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    CreateImage { image: ResourceId },
    CreateUniformBuffer { buffer: ResourceId },
    InstallDescriptors,
    CreateKernel(KernelId),
    CreatePipeline(PipelineId),
    /// Allocator reset, with the timeline value observed at that moment.
    Reset { slot: SlotIndex, completed: FenceValue },
    Acquire { image: ResourceId },
    UniformWrite { slot: SlotIndex },
    Submit { slot: SlotIndex, frame: u64, commands: usize },
    Signal(FenceValue),
    /// The CPU blocked until `value`.
    Wait { value: FenceValue },
    Present { image: ResourceId },
}

#[derive(Debug)]
struct SimBuffer {
    desc: UniformBufferDesc,
    bytes: Vec<u8>,
    /// Bytes written into each region by the latest write.
    written: Vec<usize>,
}

/// A fake GPU whose timeline trails submission by `lag + 1` signals.
#[derive(Debug)]
pub struct SimulatedGpu {
    extent: Extent,
    lag: u64,
    completed: FenceValue,
    events: Vec<SimEvent>,
    submitted: Vec<CommandBuffer>,
    images: BTreeMap<ResourceId, ImageDesc>,
    buffers: BTreeMap<ResourceId, SimBuffer>,
    states: BTreeMap<ResourceId, ResourceState>,
    directory: Option<DescriptorDirectory>,
    kernels: u32,
    pipelines: u32,
    /// Slots submitted since the last signal.
    unsignaled: Vec<SlotIndex>,
    /// Fence value guarding each slot's latest submission.
    slot_fences: BTreeMap<SlotIndex, FenceValue>,
    stall_waits: bool,
    submits_left: Option<usize>,
}

impl SimulatedGpu {
    pub fn new(extent: Extent) -> Self {
        Self::with_lag(extent, 0)
    }

    /// `lag` frames of extra GPU latency. With `lag = 0` a value completes once
    /// the next one is signaled.
    pub fn with_lag(extent: Extent, lag: u64) -> Self {
        Self {
            extent,
            lag,
            completed: FenceValue::ZERO,
            events: Vec::new(),
            submitted: Vec::new(),
            images: BTreeMap::new(),
            buffers: BTreeMap::new(),
            states: BTreeMap::new(),
            directory: None,
            kernels: 0,
            pipelines: 0,
            unsignaled: Vec::new(),
            slot_fences: BTreeMap::new(),
            stall_waits: false,
            submits_left: None,
        }
    }

    /// Makes [`wait_for`](GpuBackend::wait_for) return without advancing the timeline.
    pub fn stall_waits(&mut self) {
        self.stall_waits = true;
    }

    /// Fails every submit after the first `n`.
    pub fn fail_submit_after(&mut self, n: usize) {
        self.submits_left = Some(n);
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn submitted(&self) -> &[CommandBuffer] {
        &self.submitted
    }

    /// Presented images, in present order.
    pub fn presents(&self) -> Vec<ResourceId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Present { image } => Some(*image),
                _ => None,
            })
            .collect()
    }

    pub fn image(&self, id: ResourceId) -> Option<&ImageDesc> {
        self.images.get(&id)
    }

    /// Bytes last written to one slot's region of a uniform buffer.
    pub fn uniform_region(&self, buffer: ResourceId, slot: SlotIndex) -> Option<&[u8]> {
        let buffer = self.buffers.get(&buffer)?;
        let start = slot.get() * buffer.desc.region_size as usize;
        let len = *buffer.written.get(slot.get())?;
        buffer.bytes.get(start..start + len)
    }

    /// Last state the simulator saw a barrier leave `id` in.
    pub fn observed_state(&self, id: ResourceId) -> Option<ResourceState> {
        self.states.get(&id).copied()
    }

    fn directory(&self, call: &'static str) -> GpuResult<&DescriptorDirectory> {
        self.directory
            .as_ref()
            .ok_or_else(|| GpuError::api(call, "descriptors not installed"))
    }

    fn check_descriptor(&self, call: &'static str, index: DescriptorIndex) -> GpuResult<()> {
        self.directory(call)?
            .entry(index)
            .map(|_| ())
            .map_err(|e| GpuError::api(call, e))
    }

    fn validate(&mut self, buffer: &CommandBuffer) -> GpuResult<()> {
        let mut kernel_bound = false;
        let mut pipeline_bound = false;
        for command in buffer.commands() {
            match command {
                Command::Barriers(barriers) => {
                    for b in barriers {
                        if let Some(seen) = self.states.get(&b.resource) {
                            if *seen != b.before {
                                return Err(GpuError::api(
                                    "submit",
                                    format!("barrier {b} but resource is {seen}"),
                                ));
                            }
                        }
                        self.states.insert(b.resource, b.after);
                    }
                }
                Command::ClearRenderTarget { view, .. } => self.check_descriptor("clear", *view)?,
                Command::BindKernel(id) => {
                    if id.0 >= self.kernels {
                        return Err(GpuError::api("bind", format!("unknown kernel {}", id.0)));
                    }
                    kernel_bound = true;
                }
                Command::BindPipeline(id) => {
                    if id.0 >= self.pipelines {
                        return Err(GpuError::api("bind", format!("unknown pipeline {}", id.0)));
                    }
                    pipeline_bound = true;
                }
                Command::BindTable { descriptor, .. } => {
                    self.check_descriptor("bind", *descriptor)?
                }
                Command::Dispatch { groups } => {
                    if !kernel_bound {
                        return Err(GpuError::api("dispatch", "no kernel bound"));
                    }
                    if groups.contains(&0) {
                        return Err(GpuError::api("dispatch", "empty dispatch"));
                    }
                }
                Command::Draw { target, .. } => {
                    if !pipeline_bound {
                        return Err(GpuError::api("draw", "no pipeline bound"));
                    }
                    self.check_descriptor("draw", *target)?;
                }
                Command::CopyImage {
                    source,
                    destination,
                } => {
                    self.check_descriptor("copy", *source)?;
                    self.check_descriptor("copy", *destination)?;
                }
            }
        }
        Ok(())
    }
}

impl GpuBackend for SimulatedGpu {
    fn surface_extent(&self) -> Extent {
        self.extent
    }

    fn create_image(&mut self, id: ResourceId, desc: &ImageDesc) -> GpuResult<()> {
        if desc.extent.is_empty() {
            return Err(GpuError::init(format!("{}: zero-sized image", desc.label)));
        }
        self.images.insert(id, desc.clone());
        self.events.push(SimEvent::CreateImage { image: id });
        Ok(())
    }

    fn create_uniform_buffer(&mut self, id: ResourceId, desc: &UniformBufferDesc) -> GpuResult<()> {
        let size = desc.region_size as usize * desc.regions;
        self.buffers.insert(
            id,
            SimBuffer {
                desc: desc.clone(),
                bytes: vec![0; size],
                written: vec![0; desc.regions],
            },
        );
        self.events.push(SimEvent::CreateUniformBuffer { buffer: id });
        Ok(())
    }

    fn install_descriptors(&mut self, directory: &DescriptorDirectory) -> GpuResult<()> {
        if !directory.is_sealed() {
            return Err(GpuError::init("descriptor directory installed before sealing"));
        }
        for heap in crate::descriptor::HeapKind::ALL {
            for (index, entry) in directory.iter(heap) {
                let known = self.images.contains_key(&entry.resource)
                    || self.buffers.contains_key(&entry.resource);
                if !known {
                    return Err(GpuError::init(format!(
                        "descriptor {index:?} names a resource that was never created"
                    )));
                }
            }
        }
        self.directory = Some(directory.clone());
        self.events.push(SimEvent::InstallDescriptors);
        Ok(())
    }

    fn create_kernel(&mut self, desc: &KernelDesc<'_>) -> GpuResult<KernelId> {
        if desc.source.trim().is_empty() {
            return Err(GpuError::init(format!("{}: empty kernel source", desc.label)));
        }
        let directory = self
            .directory
            .as_ref()
            .ok_or_else(|| GpuError::init("kernel created before descriptors were installed"))?;
        for b in desc.bindings {
            directory
                .entry(b.descriptor)
                .map_err(|e| GpuError::init(format!("{}: {e}", desc.label)))?;
        }
        let id = KernelId(self.kernels);
        self.kernels += 1;
        self.events.push(SimEvent::CreateKernel(id));
        Ok(id)
    }

    fn create_raster_pipeline(&mut self, desc: &RasterPipelineDesc<'_>) -> GpuResult<PipelineId> {
        if desc.source.trim().is_empty() {
            return Err(GpuError::init(format!("{}: empty shader source", desc.label)));
        }
        let id = PipelineId(self.pipelines);
        self.pipelines += 1;
        self.events.push(SimEvent::CreatePipeline(id));
        Ok(id)
    }

    fn reset_allocator(&mut self, slot: SlotIndex) -> GpuResult<()> {
        if let Some(value) = self.slot_fences.get(&slot) {
            if *value > self.completed {
                return Err(GpuError::api(
                    "reset_allocator",
                    format!(
                        "slot {slot} reset while value {value} is in flight (completed {})",
                        self.completed
                    ),
                ));
            }
        }
        self.events.push(SimEvent::Reset {
            slot,
            completed: self.completed,
        });
        Ok(())
    }

    fn acquire_swapchain_image(&mut self, image: ResourceId) -> GpuResult<()> {
        match self.images.get(&image) {
            Some(desc) if desc.role == ImageRole::Swapchain => {
                self.events.push(SimEvent::Acquire { image });
                Ok(())
            }
            _ => Err(GpuError::api("acquire", format!("#{} is not a swapchain image", image.raw()))),
        }
    }

    fn write_uniforms(&mut self, buffer: ResourceId, slot: SlotIndex, bytes: &[u8]) -> GpuResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GpuError::api("write_uniforms", "unknown buffer"))?;
        let region = target.desc.region_size as usize;
        if bytes.len() > region || slot.get() >= target.desc.regions {
            return Err(GpuError::api("write_uniforms", "write outside the slot region"));
        }
        let start = slot.get() * region;
        target.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        target.written[slot.get()] = bytes.len();
        self.events.push(SimEvent::UniformWrite { slot });
        Ok(())
    }

    fn submit(&mut self, buffers: &[CommandBuffer]) -> GpuResult<()> {
        if let Some(left) = self.submits_left.as_mut() {
            if *left == 0 {
                return Err(GpuError::api("submit", "injected failure"));
            }
            *left -= 1;
        }
        for buffer in buffers {
            self.validate(buffer)?;
            self.unsignaled.push(buffer.slot());
            self.events.push(SimEvent::Submit {
                slot: buffer.slot(),
                frame: buffer.frame(),
                commands: buffer.len(),
            });
            self.submitted.push(buffer.clone());
        }
        Ok(())
    }

    fn signal(&mut self, value: FenceValue) -> GpuResult<()> {
        for slot in self.unsignaled.drain(..) {
            self.slot_fences.insert(slot, value);
        }
        let trailing = FenceValue::new(value.get().saturating_sub(self.lag + 1));
        self.completed = self.completed.max(trailing);
        self.events.push(SimEvent::Signal(value));
        Ok(())
    }

    fn completed_value(&self) -> GpuResult<FenceValue> {
        Ok(self.completed)
    }

    fn wait_for(&mut self, value: FenceValue) -> GpuResult<()> {
        self.events.push(SimEvent::Wait { value });
        if !self.stall_waits {
            self.completed = self.completed.max(value);
        }
        Ok(())
    }

    fn present(&mut self, image: ResourceId) -> GpuResult<()> {
        if let Some(state) = self.states.get(&image) {
            if *state != ResourceState::Presentable {
                return Err(GpuError::api("present", format!("image is {state}")));
            }
        }
        self.events.push(SimEvent::Present { image });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_trails_signals_by_lag_plus_one() {
        let mut gpu = SimulatedGpu::with_lag(Extent::new(1, 1), 2);
        for v in 1..=3 {
            gpu.signal(FenceValue::new(v)).unwrap();
            assert_eq!(gpu.completed_value().unwrap(), FenceValue::ZERO);
        }
        gpu.signal(FenceValue::new(4)).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), FenceValue::new(1));
    }

    #[test]
    fn wait_advances_unless_stalled() {
        let mut gpu = SimulatedGpu::with_lag(Extent::new(1, 1), 9);
        gpu.signal(FenceValue::new(1)).unwrap();
        gpu.wait_for(FenceValue::new(1)).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), FenceValue::new(1));

        gpu.stall_waits();
        gpu.signal(FenceValue::new(2)).unwrap();
        gpu.wait_for(FenceValue::new(2)).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), FenceValue::new(1));
    }

    #[test]
    fn reset_of_in_flight_slot_is_caught() {
        let mut gpu = SimulatedGpu::with_lag(Extent::new(1, 1), 5);
        let slot = SlotIndex::new(0);
        gpu.submit(&[CommandBuffer {
            slot,
            frame: 0,
            commands: Vec::new(),
        }])
        .unwrap();
        gpu.signal(FenceValue::new(1)).unwrap();

        assert!(gpu.reset_allocator(slot).is_err());
        gpu.wait_for(FenceValue::new(1)).unwrap();
        assert!(gpu.reset_allocator(slot).is_ok());
    }

    #[test]
    fn injected_submit_failure() {
        let mut gpu = SimulatedGpu::new(Extent::new(1, 1));
        gpu.fail_submit_after(0);
        assert!(matches!(gpu.submit(&[]), Err(GpuError::Api { call: "submit", .. })));
    }
}

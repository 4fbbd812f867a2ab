use crate::command::CommandBuffer;
use crate::descriptor::DescriptorDirectory;
use crate::frame::SlotIndex;
use crate::resource::{PresentToken, ResourceId};

use super::backend::{
    Extent, GpuBackend, ImageDesc, KernelDesc, KernelId, PipelineFactory, PipelineId,
    RasterPipelineDesc, UniformBufferDesc,
};
use super::fence::{FenceCounter, FenceValue};
use super::{GpuError, GpuResult};

/// Owns the backend (logical device + queue) and the fence counter.
///
/// The fence counter is reachable only through [`signal_fence`](Self::signal_fence)
/// and [`wait_for_fence_value`](Self::wait_for_fence_value), so there is exactly
/// one timeline and exactly one place values are issued.
pub struct DeviceContext<B: GpuBackend> {
    backend: B,
    fence: FenceCounter,
}

impl<B: GpuBackend> DeviceContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            fence: FenceCounter::default(),
        }
    }

    /// Read access to the backend, for diagnostics and tests.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn surface_extent(&self) -> Extent {
        self.backend.surface_extent()
    }

    /// Enqueues recorded command buffers in the given order. Non-blocking.
    pub fn submit(&mut self, buffers: &[CommandBuffer]) -> GpuResult<()> {
        if buffers.is_empty() {
            return Ok(());
        }
        log::trace!("submit {} command buffer(s)", buffers.len());
        self.backend.submit(buffers)
    }

    /// Issues a new fence value and enqueues its signal behind all submitted work.
    ///
    /// Call once per frame, after the frame's work has been submitted.
    pub fn signal_fence(&mut self) -> GpuResult<FenceValue> {
        let value = self.fence.issue();
        self.backend.signal(value)?;
        log::trace!("signal fence {value}");
        Ok(value)
    }

    /// Returns whether the GPU timeline has reached `value`.
    pub fn is_complete(&self, value: FenceValue) -> GpuResult<bool> {
        Ok(self.backend.completed_value()? >= value)
    }

    /// Highest value the GPU has reached.
    pub fn completed_value(&self) -> GpuResult<FenceValue> {
        self.backend.completed_value()
    }

    /// Blocks until the GPU timeline reaches `value`.
    ///
    /// No-op if already reached. Waiting on a value that was never issued is a
    /// precondition violation: it could never complete.
    pub fn wait_for_fence_value(&mut self, value: FenceValue) -> GpuResult<()> {
        if value > self.fence.highest() {
            return Err(GpuError::precondition(format!(
                "wait for fence value {value} which was never signaled (highest {})",
                self.fence.highest()
            )));
        }

        if self.is_complete(value)? {
            return Ok(());
        }

        log::debug!("cpu blocked on fence value {value}");
        self.backend.wait_for(value)?;

        let reached = self.backend.completed_value()?;
        if reached < value {
            return Err(GpuError::FenceWait {
                value,
                reason: format!("wait returned with timeline at {reached}"),
            });
        }
        Ok(())
    }

    /// Signals and waits for a fresh value: no GPU work issued before this
    /// call is still in flight when it returns.
    pub fn drain(&mut self) -> GpuResult<FenceValue> {
        let value = self.signal_fence()?;
        self.wait_for_fence_value(value)?;
        log::debug!("queue drained at fence value {value}");
        Ok(value)
    }

    /// Highest fence value ever issued.
    pub fn highest_signaled(&self) -> FenceValue {
        self.fence.highest()
    }

    pub fn present(&mut self, token: PresentToken) -> GpuResult<()> {
        self.backend.present(token.image())
    }

    pub(crate) fn create_image(&mut self, id: ResourceId, desc: &ImageDesc) -> GpuResult<()> {
        self.backend.create_image(id, desc)
    }

    pub(crate) fn create_uniform_buffer(
        &mut self,
        id: ResourceId,
        desc: &UniformBufferDesc,
    ) -> GpuResult<()> {
        self.backend.create_uniform_buffer(id, desc)
    }

    pub(crate) fn install_descriptors(&mut self, directory: &DescriptorDirectory) -> GpuResult<()> {
        self.backend.install_descriptors(directory)
    }

    pub(crate) fn create_kernel(&mut self, desc: &KernelDesc<'_>) -> GpuResult<KernelId> {
        self.backend.create_kernel(desc)
    }

    pub(crate) fn reset_allocator(&mut self, slot: SlotIndex) -> GpuResult<()> {
        self.backend.reset_allocator(slot)
    }

    pub(crate) fn acquire_swapchain_image(&mut self, image: ResourceId) -> GpuResult<()> {
        self.backend.acquire_swapchain_image(image)
    }

    pub(crate) fn write_uniforms(
        &mut self,
        buffer: ResourceId,
        slot: SlotIndex,
        bytes: &[u8],
    ) -> GpuResult<()> {
        self.backend.write_uniforms(buffer, slot, bytes)
    }
}

impl<B: GpuBackend> PipelineFactory for DeviceContext<B> {
    fn create_raster_pipeline(&mut self, desc: &RasterPipelineDesc<'_>) -> GpuResult<PipelineId> {
        self.backend.create_raster_pipeline(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{SimEvent, SimulatedGpu};

    fn ctx(lag: u64) -> DeviceContext<SimulatedGpu> {
        DeviceContext::new(SimulatedGpu::with_lag(Extent::new(64, 32), lag))
    }

    #[test]
    fn signal_values_are_strictly_increasing() {
        let mut ctx = ctx(2);
        let a = ctx.signal_fence().unwrap();
        let b = ctx.signal_fence().unwrap();
        let c = ctx.signal_fence().unwrap();
        assert!(a < b && b < c);
        assert_eq!(ctx.highest_signaled(), c);
    }

    #[test]
    fn wait_on_satisfied_value_does_not_reach_backend() {
        let mut ctx = ctx(0);
        let first = ctx.signal_fence().unwrap();
        ctx.signal_fence().unwrap();
        assert!(ctx.is_complete(first).unwrap());

        ctx.wait_for_fence_value(first).unwrap();
        ctx.wait_for_fence_value(first).unwrap();
        ctx.wait_for_fence_value(FenceValue::ZERO).unwrap();

        assert!(
            !ctx.backend()
                .events()
                .iter()
                .any(|e| matches!(e, SimEvent::Wait { .. }))
        );
    }

    #[test]
    fn wait_on_outstanding_value_blocks_until_reached() {
        let mut ctx = ctx(3);
        let v = ctx.signal_fence().unwrap();
        assert!(!ctx.is_complete(v).unwrap());

        ctx.wait_for_fence_value(v).unwrap();
        assert!(ctx.is_complete(v).unwrap());
        assert!(ctx.backend().events().contains(&SimEvent::Wait { value: v }));
    }

    #[test]
    fn waiting_on_unissued_value_is_rejected() {
        let mut ctx = ctx(0);
        let err = ctx.wait_for_fence_value(FenceValue::new(7)).unwrap_err();
        assert!(matches!(err, GpuError::Precondition(_)));
    }

    #[test]
    fn drain_reaches_the_highest_value() {
        let mut ctx = ctx(5);
        for _ in 0..4 {
            ctx.signal_fence().unwrap();
        }
        let drained = ctx.drain().unwrap();
        assert_eq!(drained, ctx.highest_signaled());
        assert_eq!(ctx.completed_value().unwrap(), drained);
    }

    #[test]
    fn short_wait_surfaces_as_fence_wait_error() {
        let mut ctx = ctx(4);
        ctx.backend.stall_waits();
        let v = ctx.signal_fence().unwrap();
        let err = ctx.wait_for_fence_value(v).unwrap_err();
        assert!(matches!(err, GpuError::FenceWait { .. }));
    }
}

//! The per-frame pass sequence: overlay, compute, copy to the swapchain.

use crate::command::Recording;
use crate::descriptor::{COMPUTE_OUTPUT_VIEW, overlay_target_view, swapchain_view};
use crate::device::{Extent, GpuError, GpuResult, KernelId, TableBinding};
use crate::frame::SlotIndex;
use crate::resource::{ResourceId, ResourceState, ResourceStateMachine};

use super::collaborators::{Overlay, OverlayPass};

/// Engine-owned resources every frame touches.
#[derive(Debug, Clone)]
pub struct FrameResources {
    pub swapchain: Box<[ResourceId]>,
    pub compute_output: ResourceId,
    pub overlay_target: ResourceId,
    pub uniforms: ResourceId,
}

impl FrameResources {
    /// Swapchain image paired with `slot`.
    pub fn swapchain_image(&self, slot: SlotIndex) -> GpuResult<ResourceId> {
        self.swapchain
            .get(slot.get())
            .copied()
            .ok_or_else(|| GpuError::precondition(format!("no swapchain image for slot {slot}")))
    }
}

/// A compiled kernel and the tables it expects.
#[derive(Debug, Clone)]
pub struct KernelBinding {
    pub id: KernelId,
    pub workgroup_size: [u32; 3],
    pub bindings: Vec<TableBinding>,
}

impl KernelBinding {
    /// Workgroup count covering `extent`, at least one per axis.
    pub fn groups_for(&self, extent: Extent) -> [u32; 3] {
        let [x, y, z] = self.workgroup_size;
        [
            extent.width.div_ceil(x.max(1)).max(1),
            extent.height.div_ceil(y.max(1)).max(1),
            1u32.div_ceil(z.max(1)).max(1),
        ]
    }
}

pub(crate) struct FramePlan<'a> {
    pub slot: SlotIndex,
    pub slots: usize,
    pub extent: Extent,
    pub clear_color: [f32; 4],
    pub resources: &'a FrameResources,
    pub kernel: &'a KernelBinding,
}

/// Records one frame into `rec`, driving every state change through `states`.
///
/// Every resource ends the frame in the state it started in.
pub(crate) fn record_frame(
    rec: &mut Recording<'_>,
    states: &mut ResourceStateMachine,
    plan: &FramePlan<'_>,
    overlay: Option<&mut dyn Overlay>,
) -> GpuResult<()> {
    let swap = plan.resources.swapchain_image(plan.slot)?;
    let out = plan.resources.compute_output;
    let rt = plan.resources.overlay_target;

    let mut open = states.batch();
    open.transition(swap, ResourceState::CopyDestination)?
        .transition(out, ResourceState::UnorderedAccess)?
        .transition(rt, ResourceState::RenderTarget)?;
    rec.barriers(open.finish());

    let target = overlay_target_view(plan.slots);
    rec.clear_render_target(target, plan.clear_color);
    if let Some(overlay) = overlay {
        let mut pass = OverlayPass::new(rec, target, plan.extent);
        overlay.record(&mut pass)?;
        log::trace!("overlay recorded {} draw(s)", pass.draws());
    }
    rec.barrier(states.transition(rt, ResourceState::ShaderReadable)?);

    rec.bind_kernel(plan.kernel.id);
    for b in &plan.kernel.bindings {
        rec.bind_table(b.binding, b.descriptor);
    }
    rec.dispatch(plan.kernel.groups_for(plan.extent));
    rec.barrier(states.transition(out, ResourceState::CopySource)?);

    rec.copy_image(COMPUTE_OUTPUT_VIEW, swapchain_view(plan.slot.get()));
    rec.barrier(states.transition(swap, ResourceState::Presentable)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(workgroup_size: [u32; 3]) -> KernelBinding {
        KernelBinding {
            id: KernelId::from_raw(0),
            workgroup_size,
            bindings: Vec::new(),
        }
    }

    #[test]
    fn dispatch_covers_the_whole_image() {
        assert_eq!(kernel([8, 8, 1]).groups_for(Extent::new(100, 50)), [13, 7, 1]);
        assert_eq!(kernel([16, 16, 1]).groups_for(Extent::new(64, 64)), [4, 4, 1]);
    }

    #[test]
    fn dispatch_is_never_empty() {
        assert_eq!(kernel([32, 32, 4]).groups_for(Extent::new(1, 1)), [1, 1, 1]);
        assert_eq!(kernel([0, 0, 0]).groups_for(Extent::new(3, 2)), [3, 2, 1]);
    }
}

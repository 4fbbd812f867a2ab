use std::ops::Range;

use crate::command::Recording;
use crate::descriptor::{DescriptorIndex, HeapKind, OVERLAY_SAMPLED_VIEW};
use crate::device::{Extent, GpuError, GpuResult, PipelineFactory, PipelineId};
use crate::input::InputState;
use crate::time::FrameTime;
use crate::uniform::FrameUniforms;

/// What the window/input collaborator reports for one loop iteration.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub quit_requested: bool,
    pub state: &'a InputState,
}

/// Source of per-iteration input.
pub trait InputSource {
    fn poll(&mut self) -> FrameInput<'_>;
}

/// Maps input and time to the scene parameters the kernel reads.
pub trait SceneController {
    fn update(&mut self, input: &InputState, time: FrameTime, uniforms: &mut FrameUniforms);
}

/// A controller that leaves the uniforms untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticScene;

impl SceneController for StaticScene {
    fn update(&mut self, _input: &InputState, _time: FrameTime, _uniforms: &mut FrameUniforms) {}
}

/// Draws into the off-screen overlay target each frame.
///
/// The target is already in the render-target state when
/// [`record`](Self::record) is called, and is cleared. The frame loop takes
/// it back afterwards.
pub trait Overlay {
    /// Creates pipelines. Called once during start-up.
    fn prepare(&mut self, factory: &mut dyn PipelineFactory) -> GpuResult<()>;

    fn record(&mut self, pass: &mut OverlayPass<'_, '_>) -> GpuResult<()>;
}

/// Restricted view of a recording handed to an [`Overlay`].
///
/// Draws always land on the overlay target; the overlay cannot sample the
/// image it is drawing into.
pub struct OverlayPass<'p, 'r> {
    recording: &'p mut Recording<'r>,
    target: DescriptorIndex,
    extent: Extent,
    draws: usize,
}

impl<'p, 'r> OverlayPass<'p, 'r> {
    pub(crate) fn new(
        recording: &'p mut Recording<'r>,
        target: DescriptorIndex,
        extent: Extent,
    ) -> Self {
        Self {
            recording,
            target,
            extent,
            draws: 0,
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn frame(&self) -> u64 {
        self.recording.frame()
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineId) {
        self.recording.bind_pipeline(pipeline);
    }

    pub fn bind_table(&mut self, binding: u32, descriptor: DescriptorIndex) -> GpuResult<()> {
        if descriptor.heap != HeapKind::ShaderVisible || descriptor == OVERLAY_SAMPLED_VIEW {
            return Err(GpuError::precondition(format!(
                "overlay cannot bind {descriptor:?}"
            )));
        }
        self.recording.bind_table(binding, descriptor);
        Ok(())
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.recording.draw(self.target, vertices, instances);
        self.draws += 1;
    }
}

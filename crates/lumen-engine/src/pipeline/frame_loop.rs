use crate::command::CommandRecorder;
use crate::descriptor::{
    COMPUTE_OUTPUT_VIEW, DescriptorDirectory, DirectoryLayout, OVERLAY_SAMPLED_VIEW, UNIFORM_VIEW,
    ViewKind, overlay_target_view, swapchain_view,
};
use crate::device::{
    DeviceContext, Extent, FenceValue, GpuBackend, GpuError, GpuResult, ImageDesc, ImageFormat,
    ImageRole, KernelDesc,
};
use crate::frame::{FrameFenceTracker, SlotReady};
use crate::input::InputState;
use crate::resource::{ResourceKind, ResourceState, ResourceStateMachine};
use crate::time::{FrameClock, FrameTime};
use crate::uniform::{FrameUniforms, UniformRing};

use super::collaborators::{FrameInput, InputSource, Overlay, SceneController};
use super::config::EngineConfig;
use super::passes::{self, FramePlan, FrameResources, KernelBinding};

/// Lifecycle of the frame loop.
///
/// Initialization is [`FrameLoop::new`] itself: a constructed loop is already
/// `Running`, and a failed one never exists.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopPhase {
    Running,
    /// Entered on quit or on the first error; only `shutdown` is meaningful.
    ShuttingDown,
    /// Drained; no GPU work is outstanding.
    Stopped,
}

/// What the caller should do after a tick.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Summary reported when the loop stops.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub last_fence: FenceValue,
}

/// Orchestrates update, gate, record, submit, signal, present and advance.
pub struct FrameLoop<B: GpuBackend> {
    phase: LoopPhase,
    config: EngineConfig,
    extent: Extent,
    device: DeviceContext<B>,
    directory: DescriptorDirectory,
    states: ResourceStateMachine,
    tracker: FrameFenceTracker,
    recorder: CommandRecorder,
    resources: FrameResources,
    ring: UniformRing,
    uniforms: FrameUniforms,
    kernel: KernelBinding,
    overlay: Option<Box<dyn Overlay>>,
    frames: u64,
}

impl<B: GpuBackend> FrameLoop<B> {
    /// Builds the fixed resource set, seals the descriptor directory and
    /// compiles the kernel. Every failure here is an `Init` error.
    pub fn new(
        backend: B,
        config: EngineConfig,
        kernel: &KernelDesc<'_>,
        mut overlay: Option<Box<dyn Overlay>>,
    ) -> GpuResult<Self> {
        let mut device = DeviceContext::new(backend);
        let tracker = FrameFenceTracker::new(config.slots)?;
        let slots = tracker.len();

        let extent = device.surface_extent();
        if extent.is_empty() {
            return Err(GpuError::init(format!(
                "surface has no area ({}x{})",
                extent.width, extent.height
            )));
        }
        if kernel.workgroup_size.contains(&0) {
            return Err(GpuError::init(format!(
                "{}: workgroup size {:?} has an empty axis",
                kernel.label, kernel.workgroup_size
            )));
        }

        let mut states = ResourceStateMachine::new();
        let swapchain = (0..slots)
            .map(|_| {
                states.register(
                    "swapchain image",
                    ResourceKind::SwapchainImage,
                    ResourceState::Presentable,
                )
            })
            .collect::<GpuResult<Vec<_>>>()?
            .into_boxed_slice();
        let resources = FrameResources {
            swapchain,
            compute_output: states.register(
                "compute output",
                ResourceKind::ComputeOutput,
                ResourceState::CopySource,
            )?,
            overlay_target: states.register(
                "overlay target",
                ResourceKind::RenderTarget,
                ResourceState::ShaderReadable,
            )?,
            uniforms: states.register(
                "frame uniforms",
                ResourceKind::UniformBuffer,
                ResourceState::GenericRead,
            )?,
        };

        let image = |label, role| ImageDesc {
            label,
            extent,
            format: ImageFormat::Rgba8Unorm,
            role,
        };
        for id in resources.swapchain.iter() {
            device.create_image(*id, &image("swapchain image", ImageRole::Swapchain))?;
        }
        device.create_image(
            resources.compute_output,
            &image("compute output", ImageRole::ComputeOutput),
        )?;
        device.create_image(
            resources.overlay_target,
            &image("overlay target", ImageRole::RenderTarget),
        )?;
        let ring = UniformRing::create(&mut device, resources.uniforms, slots)?;

        let mut directory = DescriptorDirectory::new(DirectoryLayout::for_slots(slots));
        directory.assign(
            COMPUTE_OUTPUT_VIEW,
            resources.compute_output,
            ViewKind::StorageImage,
        )?;
        directory.assign(UNIFORM_VIEW, resources.uniforms, ViewKind::UniformBuffer)?;
        directory.assign(
            OVERLAY_SAMPLED_VIEW,
            resources.overlay_target,
            ViewKind::SampledImage,
        )?;
        for (i, id) in resources.swapchain.iter().enumerate() {
            directory.assign(swapchain_view(i), *id, ViewKind::RenderTarget)?;
        }
        directory.assign(
            overlay_target_view(slots),
            resources.overlay_target,
            ViewKind::RenderTarget,
        )?;
        directory.seal();
        device.install_descriptors(&directory)?;

        let kernel = KernelBinding {
            id: device.create_kernel(kernel)?,
            workgroup_size: kernel.workgroup_size,
            bindings: kernel.bindings.to_vec(),
        };

        if config.overlay {
            if let Some(overlay) = overlay.as_mut() {
                overlay.prepare(&mut device)?;
            }
        }

        log::info!(
            "frame loop running: {} slot(s), {}x{}, {} tracked resource(s)",
            slots,
            extent.width,
            extent.height,
            states.len()
        );

        Ok(Self {
            phase: LoopPhase::Running,
            config,
            extent,
            device,
            directory,
            states,
            tracker,
            recorder: CommandRecorder::new(slots),
            resources,
            ring,
            uniforms: FrameUniforms::default(),
            kernel,
            overlay,
            frames: 0,
        })
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Frames submitted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn device(&self) -> &DeviceContext<B> {
        &self.device
    }

    pub fn resources(&self) -> &FrameResources {
        &self.resources
    }

    pub fn states(&self) -> &ResourceStateMachine {
        &self.states
    }

    pub fn directory(&self) -> &DescriptorDirectory {
        &self.directory
    }

    pub fn tracker(&self) -> &FrameFenceTracker {
        &self.tracker
    }

    /// Uniform values of the most recent frame.
    pub fn uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            frames: self.frames,
            last_fence: self.device.highest_signaled(),
        }
    }

    /// Runs one iteration. A quit request drains and stops the loop.
    ///
    /// Any error moves the loop to `ShuttingDown` and is returned; the caller
    /// should then call [`shutdown`](Self::shutdown).
    pub fn tick(
        &mut self,
        input: FrameInput<'_>,
        time: FrameTime,
        scene: &mut dyn SceneController,
    ) -> GpuResult<LoopControl> {
        match self.phase {
            LoopPhase::Running => {}
            LoopPhase::ShuttingDown | LoopPhase::Stopped => return Ok(LoopControl::Exit),
        }

        if input.quit_requested {
            log::info!("quit requested after {} frame(s)", self.frames);
            self.shutdown()?;
            return Ok(LoopControl::Exit);
        }

        match self.render_frame(input.state, time, scene) {
            Ok(()) => Ok(LoopControl::Continue),
            Err(err) => {
                log::error!("frame {} failed: {err}", self.frames);
                self.phase = LoopPhase::ShuttingDown;
                Err(err)
            }
        }
    }

    /// Polls `input` and ticks until quit or error, then shuts down.
    pub fn run(
        &mut self,
        input: &mut dyn InputSource,
        clock: &mut FrameClock,
        scene: &mut dyn SceneController,
    ) -> GpuResult<FrameStats> {
        loop {
            let time = clock.tick();
            let frame_input = input.poll();
            match self.tick(frame_input, time, scene) {
                Ok(LoopControl::Continue) => {}
                Ok(LoopControl::Exit) => break,
                Err(err) => {
                    if let Err(drain) = self.shutdown() {
                        log::error!("shutdown after failure also failed: {drain}");
                    }
                    return Err(err);
                }
            }
        }
        self.shutdown()?;
        Ok(self.stats())
    }

    /// Drains the queue, then releases the overlay. Idempotent.
    pub fn shutdown(&mut self) -> GpuResult<FrameStats> {
        if self.phase == LoopPhase::Stopped {
            return Ok(self.stats());
        }
        self.phase = LoopPhase::ShuttingDown;

        let drained = self.device.drain()?;
        self.overlay = None;
        self.phase = LoopPhase::Stopped;

        log::info!(
            "frame loop stopped: {} frame(s) rendered, drained at fence value {drained}",
            self.frames
        );
        Ok(self.stats())
    }

    fn render_frame(
        &mut self,
        input: &InputState,
        time: FrameTime,
        scene: &mut dyn SceneController,
    ) -> GpuResult<()> {
        self.uniforms.set_screen(self.extent);
        self.uniforms.frame_index = self.frames as u32;
        scene.update(input, time, &mut self.uniforms);

        let ready = self.tracker.begin_slot(&mut self.device)?;
        let slot = ready.slot();
        let result = self.submit_frame(ready);
        if result.is_err() {
            self.tracker.abandon(slot);
        }
        result
    }

    fn submit_frame(&mut self, ready: SlotReady) -> GpuResult<()> {
        let slot = ready.slot();
        let image = self.resources.swapchain_image(slot)?;

        self.ring.write(&mut self.device, &ready, &self.uniforms)?;
        self.device.acquire_swapchain_image(image)?;

        let plan = FramePlan {
            slot,
            slots: self.tracker.len(),
            extent: self.extent,
            clear_color: self.config.clear_color,
            resources: &self.resources,
            kernel: &self.kernel,
        };
        let overlay = match self.overlay.as_deref_mut() {
            Some(o) if self.config.overlay => Some(o as &mut dyn Overlay),
            _ => None,
        };

        let mut rec = self.recorder.begin_frame(ready, self.frames, &mut self.device)?;
        passes::record_frame(&mut rec, &mut self.states, &plan, overlay)?;
        let buffer = rec.end_frame();

        let stray = self.states.away_from_home();
        if !stray.is_empty() {
            return Err(GpuError::precondition(format!(
                "{} resource(s) left away from their home state",
                stray.len()
            )));
        }

        self.device.submit(std::slice::from_ref(&buffer))?;
        let value = self.device.signal_fence()?;
        self.tracker.mark_submitted(slot, value)?;
        self.recorder.retire(buffer);

        let token = self.states.present_token(image)?;
        self.device.present(token)?;

        self.tracker.advance();
        self.frames += 1;
        Ok(())
    }
}

impl<B: GpuBackend> Drop for FrameLoop<B> {
    fn drop(&mut self) {
        if self.phase != LoopPhase::Stopped {
            if let Err(e) = self.device.drain() {
                log::error!("drain on drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{SimEvent, SimulatedGpu};
    use crate::command::Command;
    use crate::descriptor::DescriptorIndex;
    use crate::device::{PipelineFactory, PipelineId, RasterPipelineDesc, TableBinding};
    use crate::frame::SlotIndex;
    use crate::pipeline::{OverlayPass, StaticScene};
    use crate::resource::ResourceId;

    const BINDINGS: [TableBinding; 3] = [
        TableBinding {
            binding: 0,
            descriptor: COMPUTE_OUTPUT_VIEW,
        },
        TableBinding {
            binding: 1,
            descriptor: UNIFORM_VIEW,
        },
        TableBinding {
            binding: 2,
            descriptor: OVERLAY_SAMPLED_VIEW,
        },
    ];

    fn kernel() -> KernelDesc<'static> {
        KernelDesc {
            label: "test kernel",
            source: "@compute @workgroup_size(8, 8, 1) fn main() {}",
            entry_point: "main",
            workgroup_size: [8, 8, 1],
            bindings: &BINDINGS,
        }
    }

    /// Requests quit after a fixed number of polls.
    struct Scripted {
        remaining: u64,
        state: InputState,
    }

    impl Scripted {
        fn frames(n: u64) -> Self {
            Self {
                remaining: n,
                state: InputState::default(),
            }
        }
    }

    impl InputSource for Scripted {
        fn poll(&mut self) -> FrameInput<'_> {
            let quit_requested = self.remaining == 0;
            self.remaining = self.remaining.saturating_sub(1);
            FrameInput {
                quit_requested,
                state: &self.state,
            }
        }
    }

    #[derive(Default)]
    struct Hud {
        pipeline: Option<PipelineId>,
    }

    impl Overlay for Hud {
        fn prepare(&mut self, factory: &mut dyn PipelineFactory) -> GpuResult<()> {
            self.pipeline = Some(factory.create_raster_pipeline(&RasterPipelineDesc {
                label: "hud",
                source: "@vertex fn vs() {} @fragment fn fs() {}",
                vertex_entry: "vs",
                fragment_entry: "fs",
                target_format: ImageFormat::Rgba8Unorm,
                bindings: &[],
            })?);
            Ok(())
        }

        fn record(&mut self, pass: &mut OverlayPass<'_, '_>) -> GpuResult<()> {
            let pipeline = self
                .pipeline
                .ok_or_else(|| GpuError::precondition("hud not prepared"))?;
            pass.bind_pipeline(pipeline);
            pass.bind_table(0, UNIFORM_VIEW)?;
            pass.draw(0..6, 0..1);
            Ok(())
        }
    }

    fn frame_loop(slots: usize, lag: u64) -> FrameLoop<SimulatedGpu> {
        let gpu = SimulatedGpu::with_lag(Extent::new(100, 50), lag);
        FrameLoop::new(gpu, EngineConfig::default().with_slots(slots), &kernel(), None).unwrap()
    }

    fn run(fl: &mut FrameLoop<SimulatedGpu>, frames: u64) -> FrameStats {
        fl.run(
            &mut Scripted::frames(frames),
            &mut FrameClock::new(),
            &mut StaticScene,
        )
        .unwrap()
    }

    fn waits(gpu: &SimulatedGpu) -> Vec<u64> {
        gpu.events()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Wait { value } => Some(value.get()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn three_slots_with_lagging_gpu() {
        let mut fl = frame_loop(3, 2);
        let stats = run(&mut fl, 10);
        assert_eq!(stats.frames, 10);
        assert_eq!(fl.phase(), LoopPhase::Stopped);

        let gpu = fl.device().backend();
        let events = gpu.events();

        // Frames 0..2 use fresh slots; frame 3 is the first reuse of slot 0.
        let submit_of = |frame: u64| {
            events
                .iter()
                .position(|e| matches!(e, SimEvent::Submit { frame: f, .. } if *f == frame))
                .unwrap()
        };
        assert!(events[..submit_of(2)].iter().all(|e| !matches!(e, SimEvent::Wait { .. })));

        let blocked = events
            .iter()
            .position(|e| *e == SimEvent::Wait { value: FenceValue::new(1) })
            .unwrap();
        assert!(submit_of(2) < blocked && blocked < submit_of(3));
        let reset = events[blocked..]
            .iter()
            .find_map(|e| match e {
                SimEvent::Reset { slot, completed } => Some((*slot, *completed)),
                _ => None,
            })
            .unwrap();
        assert_eq!(reset.0, SlotIndex::new(0));
        assert!(reset.1 >= FenceValue::new(1));

        // Each later frame waits on the value three frames back; then the drain.
        assert_eq!(waits(gpu), vec![1, 2, 3, 4, 5, 6, 7, 11]);

        let frames: Vec<u64> = gpu.submitted().iter().map(|b| b.frame()).collect();
        assert_eq!(frames, (0..10).collect::<Vec<_>>());
        let expected: Vec<ResourceId> = (0..10)
            .map(|f| fl.resources().swapchain[f % 3])
            .collect();
        assert_eq!(gpu.presents(), expected);
    }

    #[test]
    fn single_slot_serializes_without_deadlock() {
        let mut fl = frame_loop(1, 0);
        let stats = run(&mut fl, 6);
        assert_eq!(stats.frames, 6);

        let gpu = fl.device().backend();
        assert_eq!(waits(gpu), vec![1, 2, 3, 4, 5, 7]);
        assert!(gpu.submitted().iter().all(|b| b.slot() == SlotIndex::new(0)));
    }

    #[test]
    fn no_slot_is_reset_while_in_flight() {
        for slots in 1..=4 {
            for lag in 0..=4 {
                let mut fl = frame_loop(slots, lag);
                run(&mut fl, 12);

                let mut guard = vec![FenceValue::ZERO; slots];
                let mut pending = None;
                for event in fl.device().backend().events() {
                    match event {
                        SimEvent::Reset { slot, completed } => {
                            assert!(
                                *completed >= guard[slot.get()],
                                "slots={slots} lag={lag}: slot {slot} reset early"
                            );
                        }
                        SimEvent::Submit { slot, .. } => pending = Some(*slot),
                        SimEvent::Signal(value) => {
                            if let Some(slot) = pending.take() {
                                guard[slot.get()] = *value;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    #[test]
    fn every_resource_walks_back_home_each_frame() {
        let gpu = SimulatedGpu::with_lag(Extent::new(64, 64), 1);
        let mut fl = FrameLoop::new(
            gpu,
            EngineConfig::default(),
            &kernel(),
            Some(Box::new(Hud::default())),
        )
        .unwrap();
        run(&mut fl, 5);
        assert!(fl.states().away_from_home().is_empty());

        for buffer in fl.device().backend().submitted() {
            let mut walks: std::collections::BTreeMap<ResourceId, Vec<_>> = Default::default();
            for b in buffer.barriers() {
                walks.entry(b.resource).or_default().push(*b);
            }
            for (id, walk) in walks {
                let home = walk[0].before;
                assert_eq!(walk.last().unwrap().after, home, "resource #{}", id.raw());
                for pair in walk.windows(2) {
                    assert_eq!(pair[0].after, pair[1].before);
                }
            }
        }
    }

    #[test]
    fn compute_output_transitions_twice_per_frame() {
        let mut fl = frame_loop(3, 0);
        run(&mut fl, 4);
        let out = fl.resources().compute_output;

        for buffer in fl.device().backend().submitted() {
            let walk: Vec<_> = buffer.barriers().filter(|b| b.resource == out).collect();
            assert_eq!(walk.len(), 2);
            assert_eq!(
                (walk[0].before, walk[0].after),
                (ResourceState::CopySource, ResourceState::UnorderedAccess)
            );
            assert_eq!(
                (walk[1].before, walk[1].after),
                (ResourceState::UnorderedAccess, ResourceState::CopySource)
            );
        }
    }

    #[test]
    fn overlay_draws_between_its_transitions() {
        let gpu = SimulatedGpu::with_lag(Extent::new(32, 32), 0);
        let mut fl = FrameLoop::new(
            gpu,
            EngineConfig::default(),
            &kernel(),
            Some(Box::new(Hud::default())),
        )
        .unwrap();
        run(&mut fl, 1);

        let rt = fl.resources().overlay_target;
        let target = overlay_target_view(3);
        let commands = fl.device().backend().submitted()[0].commands().to_vec();
        let index_of = |pred: fn(&Command, ResourceId, DescriptorIndex) -> bool| {
            commands.iter().position(|c| pred(c, rt, target)).unwrap()
        };

        let to_target = index_of(|c, rt, _| match c {
            Command::Barriers(list) => list
                .iter()
                .any(|b| b.resource == rt && b.after == ResourceState::RenderTarget),
            _ => false,
        });
        let clear =
            index_of(|c, _, t| matches!(c, Command::ClearRenderTarget { view, .. } if *view == t));
        let draw = index_of(|c, _, t| matches!(c, Command::Draw { target, .. } if *target == t));
        let back = index_of(|c, rt, _| match c {
            Command::Barriers(list) => list
                .iter()
                .any(|b| b.resource == rt && b.after == ResourceState::ShaderReadable),
            _ => false,
        });
        let dispatch = index_of(|c, _, _| matches!(c, Command::Dispatch { .. }));

        assert!(to_target < clear && clear < draw && draw < back && back < dispatch);
    }

    #[test]
    fn disabled_overlay_still_clears_its_target() {
        let gpu = SimulatedGpu::with_lag(Extent::new(32, 32), 0);
        let config = EngineConfig {
            overlay: false,
            ..EngineConfig::default()
        };
        let mut fl = FrameLoop::new(gpu, config, &kernel(), Some(Box::new(Hud::default()))).unwrap();
        run(&mut fl, 2);

        let rt = fl.resources().overlay_target;
        let target = overlay_target_view(3);
        for buffer in fl.device().backend().submitted() {
            let commands = buffer.commands();
            assert!(commands
                .iter()
                .any(|c| matches!(c, Command::ClearRenderTarget { view, .. } if *view == target)));
            assert!(!commands.iter().any(|c| matches!(c, Command::Draw { .. })));
            assert!(!commands.iter().any(|c| matches!(c, Command::BindPipeline(_))));

            let walk: Vec<_> = buffer.barriers().filter(|b| b.resource == rt).collect();
            assert_eq!(walk.len(), 2);
            assert_eq!(
                (walk[0].before, walk[0].after),
                (ResourceState::ShaderReadable, ResourceState::RenderTarget)
            );
            assert_eq!(
                (walk[1].before, walk[1].after),
                (ResourceState::RenderTarget, ResourceState::ShaderReadable)
            );
        }
    }

    #[test]
    fn overlay_cannot_sample_its_own_target() {
        struct Feedback;
        impl Overlay for Feedback {
            fn prepare(&mut self, _: &mut dyn PipelineFactory) -> GpuResult<()> {
                Ok(())
            }
            fn record(&mut self, pass: &mut OverlayPass<'_, '_>) -> GpuResult<()> {
                pass.bind_table(0, OVERLAY_SAMPLED_VIEW)
            }
        }

        let gpu = SimulatedGpu::new(Extent::new(8, 8));
        let mut fl =
            FrameLoop::new(gpu, EngineConfig::default(), &kernel(), Some(Box::new(Feedback)))
                .unwrap();
        let err = fl
            .tick(
                FrameInput {
                    quit_requested: false,
                    state: &InputState::default(),
                },
                FrameClock::new().tick(),
                &mut StaticScene,
            )
            .unwrap_err();
        assert!(matches!(err, GpuError::Precondition(_)));
        assert_eq!(fl.phase(), LoopPhase::ShuttingDown);
    }

    #[test]
    fn dispatch_is_sized_from_the_surface() {
        let mut fl = frame_loop(2, 0);
        run(&mut fl, 1);
        let buffer = &fl.device().backend().submitted()[0];
        assert!(buffer
            .commands()
            .contains(&Command::Dispatch { groups: [13, 7, 1] }));
    }

    #[test]
    fn each_frame_writes_its_slot_uniforms() {
        let mut fl = frame_loop(3, 0);
        run(&mut fl, 5);
        let gpu = fl.device().backend();
        let ubo = fl.resources().uniforms;

        let read = |slot: usize| -> FrameUniforms {
            bytemuck::pod_read_unaligned(gpu.uniform_region(ubo, SlotIndex::new(slot)).unwrap())
        };
        assert_eq!(read(0).frame_index, 3);
        assert_eq!(read(1).frame_index, 4);
        assert_eq!(read(2).frame_index, 2);
        assert_eq!(read(0).screen_dimensions, [100.0, 50.0]);
    }

    #[test]
    fn submit_failure_moves_to_shutting_down() {
        let mut gpu = SimulatedGpu::with_lag(Extent::new(16, 16), 1);
        gpu.fail_submit_after(2);
        let mut fl = FrameLoop::new(gpu, EngineConfig::default(), &kernel(), None).unwrap();

        let err = fl
            .run(&mut Scripted::frames(10), &mut FrameClock::new(), &mut StaticScene)
            .unwrap_err();
        assert!(matches!(err, GpuError::Api { call: "submit", .. }));
        assert_eq!(fl.frames(), 2);
        assert_eq!(fl.phase(), LoopPhase::Stopped);
        assert_eq!(fl.device().backend().presents().len(), 2);
    }

    #[test]
    fn tick_after_failure_only_exits() {
        let mut gpu = SimulatedGpu::new(Extent::new(16, 16));
        gpu.fail_submit_after(0);
        let mut fl = FrameLoop::new(gpu, EngineConfig::default(), &kernel(), None).unwrap();
        let state = InputState::default();
        let input = FrameInput {
            quit_requested: false,
            state: &state,
        };

        assert!(fl.tick(input, FrameClock::new().tick(), &mut StaticScene).is_err());
        assert_eq!(fl.phase(), LoopPhase::ShuttingDown);
        assert_eq!(
            fl.tick(input, FrameClock::new().tick(), &mut StaticScene).unwrap(),
            LoopControl::Exit
        );
        fl.shutdown().unwrap();
        assert_eq!(fl.phase(), LoopPhase::Stopped);
    }

    #[test]
    fn immediate_quit_drains_without_frames() {
        let mut fl = frame_loop(3, 0);
        let stats = run(&mut fl, 0);
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.last_fence, FenceValue::new(1));
        assert!(fl.device().backend().submitted().is_empty());
    }

    #[test]
    fn zero_slots_or_empty_surface_fail_init() {
        let gpu = SimulatedGpu::new(Extent::new(16, 16));
        let err = FrameLoop::new(gpu, EngineConfig::default().with_slots(0), &kernel(), None)
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Init(_)));

        let gpu = SimulatedGpu::new(Extent::new(0, 16));
        let err = FrameLoop::new(gpu, EngineConfig::default(), &kernel(), None)
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Init(_)));
    }

    #[test]
    fn kernel_bindings_must_name_assigned_descriptors() {
        let bad = [TableBinding {
            binding: 0,
            descriptor: DescriptorIndex::shader_visible(9),
        }];
        let desc = KernelDesc {
            bindings: &bad,
            ..kernel()
        };
        let gpu = SimulatedGpu::new(Extent::new(16, 16));
        let err = FrameLoop::new(gpu, EngineConfig::default(), &desc, None)
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Init(_)));
    }
}

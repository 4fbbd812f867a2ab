use anyhow::{Context, Result, anyhow};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::backend::{WgpuBackend, WgpuInit};
use crate::device::KernelDesc;
use crate::input::{InputState, translate_window_event};
use crate::pipeline::{EngineConfig, FrameInput, FrameLoop, FrameStats, LoopControl, Overlay, SceneController};
use crate::time::FrameClock;

/// Window configuration.
///
/// The window is not resizable: images are sized once, at start-up.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// The collaborators a viewer supplies to the runtime.
pub trait App: 'static {
    /// Compute kernel compiled once the window and device exist.
    fn kernel(&self) -> KernelDesc<'_>;

    /// Overlay drawn into the off-screen target, if any. Called once.
    fn overlay(&mut self) -> Option<Box<dyn Overlay>> {
        None
    }

    fn scene(&mut self) -> &mut dyn SceneController;
}

/// Entry point: opens one window and drives a [`FrameLoop`] from its redraws.
pub struct Runtime;

impl Runtime {
    /// Blocks until the window closes or a frame fails.
    pub fn run<A: App>(
        config: RuntimeConfig,
        engine: EngineConfig,
        gpu_init: WgpuInit,
        app: A,
    ) -> Result<FrameStats> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            engine,
            gpu_init,
            app,
            entry: None,
            outcome: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state
            .outcome
            .unwrap_or_else(|| Err(anyhow!("event loop exited before the frame loop started")))
    }
}

#[self_referencing]
struct WindowEntry {
    input: InputState,
    quit: bool,
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    frame_loop: FrameLoop<WgpuBackend<'this>>,
}

struct AppState<A: App> {
    config: RuntimeConfig,
    engine: EngineConfig,
    gpu_init: WgpuInit,
    app: A,

    entry: Option<WindowEntry>,
    outcome: Option<Result<FrameStats>>,
}

fn start_frame_loop<'w, A: App>(
    window: &'w Window,
    gpu_init: WgpuInit,
    engine: EngineConfig,
    app: &mut A,
) -> Result<FrameLoop<WgpuBackend<'w>>> {
    let backend = pollster::block_on(WgpuBackend::new(window, gpu_init))
        .context("GPU initialization failed")?;
    let overlay = app.overlay();
    let kernel = app.kernel();
    FrameLoop::new(backend, engine, &kernel, overlay).context("frame loop initialization failed")
}

impl<A: App> AppState<A> {
    fn create_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size)
            .with_resizable(false);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let engine = self.engine.clone();
        let app = &mut self.app;

        WindowEntryTryBuilder {
            input: InputState::default(),
            quit: false,
            clock: FrameClock::new(),
            window,
            frame_loop_builder: |window| start_frame_loop(window, gpu_init, engine, app),
        }
        .try_build()
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop, outcome: Result<FrameStats>) {
        match &outcome {
            Ok(stats) => log::info!(
                "runtime finished: {} frame(s), last fence value {}",
                stats.frames,
                stats.last_fence
            ),
            Err(err) => log::error!("runtime stopped: {err:#}"),
        }
        self.outcome = Some(outcome);
        // Dropping the entry releases the device after the loop has drained.
        self.entry = None;
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (app, Some(entry)) = (&mut self.app, self.entry.as_mut()) else {
            return;
        };

        let result = entry.with_mut(|fields| {
            let time = fields.clock.tick();
            let input = FrameInput {
                quit_requested: *fields.quit,
                state: fields.input,
            };
            let control = fields.frame_loop.tick(input, time, app.scene());
            fields.input.end_frame();

            match control {
                Ok(LoopControl::Continue) => None,
                Ok(LoopControl::Exit) => Some(Ok(fields.frame_loop.stats())),
                Err(err) => {
                    if let Err(drain) = fields.frame_loop.shutdown() {
                        log::error!("drain after failure also failed: {drain}");
                    }
                    Some(Err(anyhow::Error::new(err).context("frame failed")))
                }
            }
        });

        match result {
            None => entry.with_window(|w| w.request_redraw()),
            Some(outcome) => self.finish(event_loop, outcome),
        }
    }
}

impl<A: App> ApplicationHandler for AppState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() || self.outcome.is_some() {
            return;
        }

        match self.create_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.entry = Some(entry);
            }
            Err(err) => self.finish(event_loop, Err(err)),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::RedrawRequested = event {
            self.redraw(event_loop);
            return;
        }

        let Some(entry) = self.entry.as_mut() else {
            return;
        };

        entry.with_mut(|fields| {
            if let Some(ev) = translate_window_event(&event) {
                fields.input.apply(ev);
            }

            match &event {
                WindowEvent::CloseRequested => *fields.quit = true,
                WindowEvent::KeyboardInput { event: key, .. }
                    if key.state == ElementState::Pressed
                        && key.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
                {
                    *fields.quit = true;
                }
                WindowEvent::Resized(size) => {
                    log::debug!("ignoring resize to {}x{}", size.width, size.height);
                }
                _ => {}
            }

            // Quit is handled by the next tick, which drains before exiting.
            if *fields.quit {
                fields.window.request_redraw();
            }
        });
    }
}

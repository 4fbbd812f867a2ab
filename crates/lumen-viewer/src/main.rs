mod overlay;
mod scene;

use anyhow::Result;

use lumen_engine::backend::WgpuInit;
use lumen_engine::descriptor::{COMPUTE_OUTPUT_VIEW, OVERLAY_SAMPLED_VIEW, UNIFORM_VIEW};
use lumen_engine::device::{KernelDesc, TableBinding};
use lumen_engine::logging::{LoggingConfig, init_logging};
use lumen_engine::pipeline::{EngineConfig, Overlay, SceneController};
use lumen_engine::window::{App, Runtime, RuntimeConfig};

use overlay::Hud;
use scene::CameraController;

const KERNEL_SOURCE: &str = include_str!("../shaders/kernel.wgsl");

const KERNEL_BINDINGS: [TableBinding; 3] = [
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

struct Viewer {
    camera: CameraController,
}

impl App for Viewer {
    fn kernel(&self) -> KernelDesc<'_> {
        KernelDesc {
            label: "sphere kernel",
            source: KERNEL_SOURCE,
            entry_point: "main",
            workgroup_size: [8, 8, 1],
            bindings: &KERNEL_BINDINGS,
        }
    }

    fn overlay(&mut self) -> Option<Box<dyn Overlay>> {
        Some(Box::new(Hud::default()))
    }

    fn scene(&mut self) -> &mut dyn SceneController {
        &mut self.camera
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let viewer = Viewer {
        camera: CameraController::default(),
    };
    let config = RuntimeConfig {
        title: "lumen viewer".to_string(),
        ..Default::default()
    };

    let stats = Runtime::run(config, EngineConfig::default(), WgpuInit::default(), viewer)?;
    log::info!("exited cleanly after {} frame(s)", stats.frames);
    Ok(())
}

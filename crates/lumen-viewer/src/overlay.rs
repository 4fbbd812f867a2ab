use lumen_engine::descriptor::UNIFORM_VIEW;
use lumen_engine::device::{GpuResult, ImageFormat, PipelineFactory, PipelineId, RasterPipelineDesc, TableBinding};
use lumen_engine::pipeline::{Overlay, OverlayPass};

const SOURCE: &str = include_str!("../shaders/overlay.wgsl");

const BINDINGS: [TableBinding; 1] = [TableBinding {
    binding: 0,
    descriptor: UNIFORM_VIEW,
}];

/// Swatch of the sphere colour plus a crosshair, drawn as three instanced
/// quads.
#[derive(Debug, Default)]
pub struct Hud {
    pipeline: Option<PipelineId>,
}

impl Overlay for Hud {
    fn prepare(&mut self, factory: &mut dyn PipelineFactory) -> GpuResult<()> {
        let id = factory.create_raster_pipeline(&RasterPipelineDesc {
            label: "hud",
            source: SOURCE,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            target_format: ImageFormat::Rgba8Unorm,
            bindings: &BINDINGS,
        })?;
        self.pipeline = Some(id);
        Ok(())
    }

    fn record(&mut self, pass: &mut OverlayPass<'_, '_>) -> GpuResult<()> {
        let Some(pipeline) = self.pipeline else {
            return Ok(());
        };
        pass.bind_pipeline(pipeline);
        for b in &BINDINGS {
            pass.bind_table(b.binding, b.descriptor)?;
        }
        pass.draw(0..6, 0..3);
        Ok(())
    }
}

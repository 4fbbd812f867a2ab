//! Per-frame uniform data and the per-slot uniform ring.

use bytemuck::{Pod, Zeroable};

use crate::device::{DeviceContext, Extent, GpuBackend, GpuResult, UniformBufferDesc};
use crate::frame::SlotReady;
use crate::resource::ResourceId;

/// Minimum alignment of a dynamic uniform offset.
pub const UNIFORM_REGION_ALIGNMENT: u64 = 256;

/// Constants the compute kernel reads each frame.
///
/// Layout matches the WGSL `FrameUniforms` struct: vec4 fields first, then
/// the screen size, frame index and field of view.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub camera_position: [f32; 4],
    pub camera_look_at: [f32; 4],
    /// xyz centre, w radius.
    pub sphere_center_radius: [f32; 4],
    pub sphere_color: [f32; 4],
    pub screen_dimensions: [f32; 2],
    pub frame_index: u32,
    /// Vertical field of view in radians.
    pub camera_fov: f32,
}

impl FrameUniforms {
    pub fn set_screen(&mut self, extent: Extent) {
        self.screen_dimensions = [extent.width as f32, extent.height as f32];
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            camera_position: [0.0, 1.0, -4.0, 1.0],
            camera_look_at: [0.0, 0.0, 0.0, 1.0],
            sphere_center_radius: [0.0, 0.0, 0.0, 1.0],
            sphere_color: [0.9, 0.35, 0.2, 1.0],
            screen_dimensions: [0.0, 0.0],
            frame_index: 0,
            camera_fov: 60f32.to_radians(),
        }
    }
}

/// Rounds `size` up to the uniform offset alignment.
pub fn aligned_region_size(size: u64) -> u64 {
    size.div_ceil(UNIFORM_REGION_ALIGNMENT).max(1) * UNIFORM_REGION_ALIGNMENT
}

/// A uniform buffer with one region per pipeline slot.
///
/// A frame only ever writes its own slot's region, and only while holding the
/// slot's [`SlotReady`], so the CPU never overwrites data an in-flight frame
/// is still reading.
#[derive(Debug)]
pub struct UniformRing {
    buffer: ResourceId,
    region_size: u64,
    regions: usize,
}

impl UniformRing {
    pub fn desc(regions: usize) -> UniformBufferDesc {
        UniformBufferDesc {
            label: "frame uniforms",
            region_size: aligned_region_size(size_of::<FrameUniforms>() as u64),
            regions,
        }
    }

    pub(crate) fn create<B: GpuBackend>(
        device: &mut DeviceContext<B>,
        buffer: ResourceId,
        regions: usize,
    ) -> GpuResult<Self> {
        let desc = Self::desc(regions);
        device.create_uniform_buffer(buffer, &desc)?;
        log::info!(
            "uniform ring: {} region(s) of {} bytes",
            desc.regions,
            desc.region_size
        );
        Ok(Self {
            buffer,
            region_size: desc.region_size,
            regions,
        })
    }

    pub fn buffer(&self) -> ResourceId {
        self.buffer
    }

    pub fn region_size(&self) -> u64 {
        self.region_size
    }

    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Byte offset of a slot's region.
    pub fn offset(&self, ready: &SlotReady) -> u64 {
        ready.slot().get() as u64 * self.region_size
    }

    /// Copies `uniforms` into the gated slot's region.
    pub fn write<B: GpuBackend>(
        &self,
        device: &mut DeviceContext<B>,
        ready: &SlotReady,
        uniforms: &FrameUniforms,
    ) -> GpuResult<()> {
        device.write_uniforms(self.buffer, ready.slot(), uniforms.as_bytes())
    }
}

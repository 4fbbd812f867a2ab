use crate::command::CommandBuffer;
use crate::descriptor::{DescriptorDirectory, DescriptorIndex};
use crate::device::{FenceValue, GpuResult};
use crate::frame::SlotIndex;
use crate::resource::ResourceId;

/// Pixel dimensions of the presentation surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Texel format of an engine-owned image.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
}

/// What an image is used for; backends derive usage flags from it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageRole {
    /// On loan from the presentation surface.
    Swapchain,
    /// Written by the compute kernel, then copied to the swapchain image.
    ComputeOutput,
    /// Drawn to by the overlay, read by the kernel.
    RenderTarget,
}

#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub label: &'static str,
    pub extent: Extent,
    pub format: ImageFormat,
    pub role: ImageRole,
}

/// A uniform buffer split into one region per pipeline slot.
#[derive(Debug, Clone)]
pub struct UniformBufferDesc {
    pub label: &'static str,
    /// Size of one region in bytes, already aligned for binding offsets.
    pub region_size: u64,
    pub regions: usize,
}

/// Opaque handle to a compiled compute kernel.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct KernelId(pub(crate) u32);

impl KernelId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Opaque handle to a rasterization pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PipelineId(pub(crate) u32);

impl PipelineId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Maps a shader binding number to a descriptor-directory entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TableBinding {
    pub binding: u32,
    pub descriptor: DescriptorIndex,
}

/// Compute kernel supplied by the shader collaborator.
#[derive(Debug, Clone)]
pub struct KernelDesc<'a> {
    pub label: &'a str,
    /// WGSL source text.
    pub source: &'a str,
    pub entry_point: &'a str,
    pub workgroup_size: [u32; 3],
    pub bindings: &'a [TableBinding],
}

/// Rasterization pipeline used by an overlay.
#[derive(Debug, Clone)]
pub struct RasterPipelineDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub target_format: ImageFormat,
    pub bindings: &'a [TableBinding],
}

/// The GPU API seam.
///
/// A backend owns the native device, queue, swapchain and fence. It executes
/// recorded [`CommandBuffer`]s in submission order. Every fallible call maps
/// native failures to [`GpuError`](super::GpuError); none are retried.
pub trait GpuBackend {
    /// Dimensions the swapchain was created with.
    fn surface_extent(&self) -> Extent;

    fn create_image(&mut self, id: ResourceId, desc: &ImageDesc) -> GpuResult<()>;

    fn create_uniform_buffer(&mut self, id: ResourceId, desc: &UniformBufferDesc) -> GpuResult<()>;

    /// Publishes the sealed descriptor directory to the GPU.
    fn install_descriptors(&mut self, directory: &DescriptorDirectory) -> GpuResult<()>;

    fn create_kernel(&mut self, desc: &KernelDesc<'_>) -> GpuResult<KernelId>;

    fn create_raster_pipeline(&mut self, desc: &RasterPipelineDesc<'_>) -> GpuResult<PipelineId>;

    /// Releases transient storage owned by the slot's command allocator.
    ///
    /// Only called once the slot's last submission is known to be complete.
    fn reset_allocator(&mut self, slot: SlotIndex) -> GpuResult<()>;

    /// Obtains the presentable image for the frame about to be recorded.
    fn acquire_swapchain_image(&mut self, image: ResourceId) -> GpuResult<()>;

    /// Copies `bytes` into the slot's region of a uniform buffer.
    fn write_uniforms(&mut self, buffer: ResourceId, slot: SlotIndex, bytes: &[u8]) -> GpuResult<()>;

    /// Enqueues closed command buffers in order. Non-blocking.
    fn submit(&mut self, buffers: &[CommandBuffer]) -> GpuResult<()>;

    /// Enqueues a queue-side signal of `value` behind all submitted work.
    fn signal(&mut self, value: FenceValue) -> GpuResult<()>;

    /// Highest value the GPU timeline has reached.
    fn completed_value(&self) -> GpuResult<FenceValue>;

    /// Blocks until the timeline reaches `value`. No timeout.
    fn wait_for(&mut self, value: FenceValue) -> GpuResult<()>;

    fn present(&mut self, image: ResourceId) -> GpuResult<()>;
}

/// Narrow factory handed to collaborators that need their own pipelines.
pub trait PipelineFactory {
    fn create_raster_pipeline(&mut self, desc: &RasterPipelineDesc<'_>) -> GpuResult<PipelineId>;
}

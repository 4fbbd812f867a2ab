//! Device context: the GPU queue, the fence timeline and the backend seam.
//!
//! This module is responsible for:
//! - defining the backend contract every GPU implementation satisfies
//! - issuing monotonically increasing fence values
//! - submission, fence waits and the shutdown drain

mod backend;
mod context;
mod error;
mod fence;

pub use backend::{
    Extent, GpuBackend, ImageDesc, ImageFormat, ImageRole, KernelDesc, KernelId, PipelineFactory,
    PipelineId, RasterPipelineDesc, TableBinding, UniformBufferDesc,
};
pub use context::DeviceContext;
pub use error::{GpuError, GpuResult};
pub use fence::FenceValue;

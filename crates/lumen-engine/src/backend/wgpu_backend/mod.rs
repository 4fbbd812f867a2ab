//! `wgpu` backend.
//!
//! Owns the instance, surface, device and queue. Recorded command buffers are
//! encoded into compute/render passes at submit time.

mod encode;
mod gpu;
mod init;
mod surface;

pub use gpu::WgpuBackend;
pub use init::WgpuInit;

//! [`GpuBackend`](crate::device::GpuBackend) implementations.
//!
//! `wgpu_backend` drives a real adapter through `wgpu`; `sim` is a
//! deterministic timeline used by tests and headless runs.

pub mod sim;
pub mod wgpu_backend;

pub use sim::{SimEvent, SimulatedGpu};
pub use wgpu_backend::{WgpuBackend, WgpuInit};

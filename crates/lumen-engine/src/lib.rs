//! Lumen engine crate.
//!
//! A multi-buffered frame pipeline: fence-gated pipeline slots, per-slot
//! command recording, explicit resource-state tracking and a frame loop that
//! drives them against a [`device::GpuBackend`].

pub mod backend;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod resource;
pub mod time;
pub mod uniform;
pub mod window;

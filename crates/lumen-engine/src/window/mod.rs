//! winit runtime.
//!
//! Owns the event loop and the window, and ticks the frame loop on every
//! redraw.

mod runtime;

pub use runtime::{App, Runtime, RuntimeConfig};

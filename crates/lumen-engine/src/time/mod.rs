//! Delta time for the frame loop.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};

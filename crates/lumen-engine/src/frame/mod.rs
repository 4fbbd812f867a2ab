//! Pipeline slots and the frame fence tracker.
//!
//! A fixed arena of slots, addressed by index and used round-robin. Each slot
//! remembers the fence value of its last submission so the CPU only blocks
//! when it is about to reuse a slot the GPU is still consuming.

mod slot;
mod tracker;

pub use slot::{PipelineSlot, SlotIndex, SlotState};
pub use tracker::{FrameFenceTracker, SlotReady};

/// Default number of frames in flight.
pub const DEFAULT_SLOT_COUNT: usize = 3;

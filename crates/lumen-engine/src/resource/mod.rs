//! Resource state machine.
//!
//! Tracks the current access state of each shared GPU resource and produces
//! the transition barriers needed before each stage. Call sites never assume
//! a resource's state; they ask for a target and get the exact barrier.

mod machine;
mod state;

pub use machine::{BarrierBatch, PresentToken, ResourceId, ResourceStateMachine};
pub use state::{Barrier, ResourceKind, ResourceState};

//! Frame loop and the collaborator contracts it drives.
//!
//! Per frame: CPU update, gate-wait of the next slot, uniform write, record,
//! submit, signal, present, advance. The only blocking points are the gate
//! and the shutdown drain.

mod collaborators;
mod config;
mod frame_loop;
mod passes;

pub use collaborators::{
    FrameInput, InputSource, Overlay, OverlayPass, SceneController, StaticScene,
};
pub use config::EngineConfig;
pub use frame_loop::{FrameLoop, FrameStats, LoopControl, LoopPhase};
pub use passes::{FrameResources, KernelBinding};

//! Backend-neutral command lists and the per-slot command recorder.

mod list;
mod recorder;

pub use list::{Command, CommandBuffer};
pub use recorder::{CommandRecorder, Recording};

use std::ops::Range;

use crate::descriptor::DescriptorIndex;
use crate::device::{KernelId, PipelineId};
use crate::frame::SlotIndex;
use crate::resource::Barrier;

/// One recorded GPU operation.
///
/// Backends execute commands strictly in recording order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// State transitions recorded at one pipeline point.
    Barriers(Vec<Barrier>),
    ClearRenderTarget {
        view: DescriptorIndex,
        color: [f32; 4],
    },
    BindKernel(KernelId),
    BindPipeline(PipelineId),
    /// Binds a descriptor-directory entry to a shader binding slot.
    BindTable {
        binding: u32,
        descriptor: DescriptorIndex,
    },
    Dispatch {
        groups: [u32; 3],
    },
    Draw {
        target: DescriptorIndex,
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    /// Full-image copy between two resources of identical extent.
    CopyImage {
        source: DescriptorIndex,
        destination: DescriptorIndex,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Barriers(_) => "barriers",
            Command::ClearRenderTarget { .. } => "clear",
            Command::BindKernel(_) => "bind-kernel",
            Command::BindPipeline(_) => "bind-pipeline",
            Command::BindTable { .. } => "bind-table",
            Command::Dispatch { .. } => "dispatch",
            Command::Draw { .. } => "draw",
            Command::CopyImage { .. } => "copy",
        }
    }
}

/// A closed recording, ready for submission.
///
/// Only [`Recording::end_frame`](super::Recording::end_frame) produces one,
/// so an open recording can never reach the queue.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    pub(crate) slot: SlotIndex,
    pub(crate) frame: u64,
    pub(crate) commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Every barrier in the buffer, flattened in recording order.
    pub fn barriers(&self) -> impl Iterator<Item = &Barrier> + '_ {
        self.commands.iter().flat_map(|c| match c {
            Command::Barriers(list) => list.as_slice(),
            _ => &[],
        })
    }
}

use std::fmt;

/// GPU access state of a resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceState {
    Presentable,
    CopyDestination,
    CopySource,
    UnorderedAccess,
    RenderTarget,
    ShaderReadable,
    GenericRead,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Presentable => "presentable",
            ResourceState::CopyDestination => "copy-dst",
            ResourceState::CopySource => "copy-src",
            ResourceState::UnorderedAccess => "unordered-access",
            ResourceState::RenderTarget => "render-target",
            ResourceState::ShaderReadable => "shader-readable",
            ResourceState::GenericRead => "generic-read",
        };
        f.write_str(name)
    }
}

/// Role of a tracked resource; restricts which states it may enter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    /// On loan from the presentation surface.
    SwapchainImage,
    /// Written by compute, copied out.
    ComputeOutput,
    /// Off-screen target an overlay draws into.
    RenderTarget,
    /// Upload-visible uniform memory.
    UniformBuffer,
}

impl ResourceKind {
    pub fn permits(self, state: ResourceState) -> bool {
        use ResourceState::*;
        match self {
            ResourceKind::SwapchainImage => {
                matches!(state, Presentable | CopyDestination | RenderTarget)
            }
            ResourceKind::ComputeOutput => {
                matches!(state, CopySource | UnorderedAccess | ShaderReadable)
            }
            ResourceKind::RenderTarget => {
                matches!(state, RenderTarget | ShaderReadable | GenericRead)
            }
            ResourceKind::UniformBuffer => matches!(state, GenericRead),
        }
    }
}

/// One state transition for one resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Barrier {
    pub resource: super::ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl fmt::Display for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {} -> {}", self.resource.raw(), self.before, self.after)
    }
}

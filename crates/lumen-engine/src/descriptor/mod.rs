//! Descriptor directory.
//!
//! Static, fixed-capacity tables that map logical view indices to GPU-visible
//! descriptor locations, one table per descriptor category.

mod directory;

pub use directory::{
    DescriptorDirectory, DescriptorEntry, DescriptorIndex, DescriptorLocation, DirectoryLayout,
    HeapKind, TableLayout, ViewKind,
};

/// Storage view of the compute output image.
pub const COMPUTE_OUTPUT_VIEW: DescriptorIndex = DescriptorIndex::shader_visible(0);

/// Per-slot view of the uniform buffer.
pub const UNIFORM_VIEW: DescriptorIndex = DescriptorIndex::shader_visible(1);

/// Sampled view of the overlay render target.
pub const OVERLAY_SAMPLED_VIEW: DescriptorIndex = DescriptorIndex::shader_visible(2);

/// Render-target view of swapchain image `slot`.
pub const fn swapchain_view(slot: usize) -> DescriptorIndex {
    DescriptorIndex::render_target(slot as u32)
}

/// Render-target view of the overlay target; follows the swapchain views.
pub const fn overlay_target_view(slots: usize) -> DescriptorIndex {
    DescriptorIndex::render_target(slots as u32)
}

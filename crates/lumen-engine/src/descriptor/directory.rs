use crate::device::{GpuError, GpuResult};
use crate::resource::ResourceId;

/// Descriptor table category.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum HeapKind {
    /// Storage, uniform and sampled views visible to shaders.
    ShaderVisible,
    /// Render-target views, used only as draw destinations.
    RenderTarget,
}

impl HeapKind {
    pub const ALL: [HeapKind; 2] = [HeapKind::ShaderVisible, HeapKind::RenderTarget];

    fn accepts(self, view: ViewKind) -> bool {
        match self {
            HeapKind::ShaderVisible => !matches!(view, ViewKind::RenderTarget),
            HeapKind::RenderTarget => matches!(view, ViewKind::RenderTarget),
        }
    }
}

/// Logical index of a view inside one table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DescriptorIndex {
    pub heap: HeapKind,
    pub index: u32,
}

impl DescriptorIndex {
    pub const fn shader_visible(index: u32) -> Self {
        Self {
            heap: HeapKind::ShaderVisible,
            index,
        }
    }

    pub const fn render_target(index: u32) -> Self {
        Self {
            heap: HeapKind::RenderTarget,
            index,
        }
    }
}

/// How a resource is viewed through a descriptor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ViewKind {
    /// Read/write image for compute.
    StorageImage,
    /// Uniform buffer, offset per pipeline slot at bind time.
    UniformBuffer,
    /// Read-only image.
    SampledImage,
    RenderTarget,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DescriptorEntry {
    pub resource: ResourceId,
    pub view: ViewKind,
}

/// GPU-visible position of a descriptor: byte offset from the table start.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DescriptorLocation {
    pub heap: HeapKind,
    pub offset: u64,
}

/// Size of one table: entry count and stride between entries.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TableLayout {
    pub capacity: u32,
    pub increment: u32,
}

/// Capacities and strides for both tables.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DirectoryLayout {
    pub shader_visible: TableLayout,
    pub render_target: TableLayout,
}

impl DirectoryLayout {
    /// Default layout for `slots` swapchain images plus one off-screen target.
    pub fn for_slots(slots: usize) -> Self {
        Self {
            shader_visible: TableLayout {
                capacity: 15,
                increment: 32,
            },
            render_target: TableLayout {
                capacity: slots as u32 + 1,
                increment: 32,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct DescriptorTable {
    layout: TableLayout,
    entries: Box<[Option<DescriptorEntry>]>,
}

impl DescriptorTable {
    fn new(layout: TableLayout) -> Self {
        Self {
            layout,
            entries: vec![None; layout.capacity as usize].into_boxed_slice(),
        }
    }
}

/// Fixed-capacity tables mapping logical view indices to descriptors.
///
/// Entries are assigned during start-up, then the directory is sealed. After
/// sealing, lookups succeed and every mutation is rejected.
#[derive(Debug, Clone)]
pub struct DescriptorDirectory {
    shader_visible: DescriptorTable,
    render_target: DescriptorTable,
    sealed: bool,
}

impl DescriptorDirectory {
    pub fn new(layout: DirectoryLayout) -> Self {
        Self {
            shader_visible: DescriptorTable::new(layout.shader_visible),
            render_target: DescriptorTable::new(layout.render_target),
            sealed: false,
        }
    }

    fn table(&self, heap: HeapKind) -> &DescriptorTable {
        match heap {
            HeapKind::ShaderVisible => &self.shader_visible,
            HeapKind::RenderTarget => &self.render_target,
        }
    }

    fn table_mut(&mut self, heap: HeapKind) -> &mut DescriptorTable {
        match heap {
            HeapKind::ShaderVisible => &mut self.shader_visible,
            HeapKind::RenderTarget => &mut self.render_target,
        }
    }

    /// Binds `index` to a view of `resource`.
    pub fn assign(
        &mut self,
        index: DescriptorIndex,
        resource: ResourceId,
        view: ViewKind,
    ) -> GpuResult<()> {
        if self.sealed {
            return Err(GpuError::precondition(format!(
                "descriptor {index:?} assigned after the directory was sealed"
            )));
        }
        if !index.heap.accepts(view) {
            return Err(GpuError::precondition(format!(
                "{view:?} view cannot live in the {:?} table",
                index.heap
            )));
        }

        let table = self.table_mut(index.heap);
        let capacity = table.layout.capacity;
        let Some(entry) = table.entries.get_mut(index.index as usize) else {
            return Err(GpuError::init(format!(
                "descriptor index {} exceeds {:?} table capacity {capacity}",
                index.index, index.heap
            )));
        };
        if entry.is_some() {
            return Err(GpuError::precondition(format!(
                "descriptor {index:?} is already assigned"
            )));
        }

        *entry = Some(DescriptorEntry { resource, view });
        Ok(())
    }

    /// Freezes index assignment.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn entry(&self, index: DescriptorIndex) -> GpuResult<DescriptorEntry> {
        self.table(index.heap)
            .entries
            .get(index.index as usize)
            .copied()
            .flatten()
            .ok_or_else(|| GpuError::precondition(format!("descriptor {index:?} is not assigned")))
    }

    /// Position of `index` within its table.
    pub fn location(&self, index: DescriptorIndex) -> GpuResult<DescriptorLocation> {
        self.entry(index)?;
        let layout = self.table(index.heap).layout;
        Ok(DescriptorLocation {
            heap: index.heap,
            offset: u64::from(index.index) * u64::from(layout.increment),
        })
    }

    pub fn capacity(&self, heap: HeapKind) -> u32 {
        self.table(heap).layout.capacity
    }

    /// Assigned entries of one table, in index order.
    pub fn iter(&self, heap: HeapKind) -> impl Iterator<Item = (DescriptorIndex, DescriptorEntry)> + '_ {
        self.table(heap)
            .entries
            .iter()
            .enumerate()
            .filter_map(move |(i, e)| {
                e.map(|entry| {
                    (
                        DescriptorIndex {
                            heap,
                            index: i as u32,
                        },
                        entry,
                    )
                })
            })
    }
}

impl Default for DescriptorDirectory {
    fn default() -> Self {
        Self::new(DirectoryLayout::for_slots(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(raw: u32) -> ResourceId {
        ResourceId::from_raw(raw)
    }

    #[test]
    fn location_is_index_times_increment() {
        let mut dir = DescriptorDirectory::default();
        dir.assign(DescriptorIndex::shader_visible(2), res(5), ViewKind::SampledImage)
            .unwrap();
        dir.seal();

        let loc = dir.location(DescriptorIndex::shader_visible(2)).unwrap();
        assert_eq!(loc.heap, HeapKind::ShaderVisible);
        assert_eq!(loc.offset, 64);
    }

    #[test]
    fn capacity_is_fixed() {
        let mut dir = DescriptorDirectory::new(DirectoryLayout::for_slots(3));
        assert_eq!(dir.capacity(HeapKind::RenderTarget), 4);

        let err = dir
            .assign(DescriptorIndex::render_target(4), res(1), ViewKind::RenderTarget)
            .unwrap_err();
        assert!(matches!(err, GpuError::Init(_)));
        assert_eq!(dir.capacity(HeapKind::RenderTarget), 4);
    }

    #[test]
    fn sealed_directory_rejects_assignment() {
        let mut dir = DescriptorDirectory::default();
        dir.assign(DescriptorIndex::shader_visible(0), res(1), ViewKind::StorageImage)
            .unwrap();
        dir.seal();

        let err = dir
            .assign(DescriptorIndex::shader_visible(1), res(2), ViewKind::UniformBuffer)
            .unwrap_err();
        assert!(matches!(err, GpuError::Precondition(_)));
        assert_eq!(
            dir.entry(DescriptorIndex::shader_visible(0)).unwrap().resource,
            res(1)
        );
    }

    #[test]
    fn index_cannot_be_reassigned() {
        let mut dir = DescriptorDirectory::default();
        let idx = DescriptorIndex::shader_visible(1);
        dir.assign(idx, res(1), ViewKind::UniformBuffer).unwrap();
        assert!(dir.assign(idx, res(2), ViewKind::UniformBuffer).is_err());
        assert_eq!(dir.entry(idx).unwrap().resource, res(1));
    }

    #[test]
    fn render_target_views_stay_in_their_table() {
        let mut dir = DescriptorDirectory::default();
        assert!(
            dir.assign(DescriptorIndex::shader_visible(0), res(1), ViewKind::RenderTarget)
                .is_err()
        );
        assert!(
            dir.assign(DescriptorIndex::render_target(0), res(1), ViewKind::SampledImage)
                .is_err()
        );
    }

    #[test]
    fn iter_yields_assigned_entries_in_order() {
        let mut dir = DescriptorDirectory::default();
        dir.assign(DescriptorIndex::shader_visible(2), res(3), ViewKind::SampledImage)
            .unwrap();
        dir.assign(DescriptorIndex::shader_visible(0), res(1), ViewKind::StorageImage)
            .unwrap();

        let indices: Vec<u32> = dir
            .iter(HeapKind::ShaderVisible)
            .map(|(i, _)| i.index)
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn unassigned_lookup_fails() {
        let dir = DescriptorDirectory::default();
        assert!(dir.entry(DescriptorIndex::shader_visible(9)).is_err());
        assert!(dir.location(DescriptorIndex::render_target(99)).is_err());
    }
}

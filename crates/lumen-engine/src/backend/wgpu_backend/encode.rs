//! Translation of recorded command buffers into `wgpu` passes.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use crate::command::{Command, CommandBuffer};
use crate::descriptor::{DescriptorDirectory, DescriptorIndex, ViewKind};
use crate::device::{GpuError, GpuResult, ImageRole, KernelId, PipelineId, TableBinding};
use crate::frame::SlotIndex;
use crate::resource::Barrier;

use super::gpu::{IMAGE_FORMAT, WgpuBackend};

/// A compiled pipeline plus the view kind expected at each binding.
pub(crate) struct GpuProgram<P> {
    pub label: String,
    pub pipeline: P,
    pub layout: Option<wgpu::BindGroupLayout>,
    pub views: Vec<(u32, ViewKind)>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum ProgramRef {
    Kernel(KernelId),
    Raster(PipelineId),
}

/// Bind groups depend only on the program and the bound descriptors, both
/// fixed after start-up, so they are built once and reused.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) struct BindGroupKey {
    program: ProgramRef,
    tables: Vec<(u32, DescriptorIndex)>,
}

pub(crate) fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

/// Bind group layout entries for a program's table bindings.
pub(crate) fn layout_entries(
    directory: &DescriptorDirectory,
    bindings: &[TableBinding],
    visibility: wgpu::ShaderStages,
) -> GpuResult<(Vec<wgpu::BindGroupLayoutEntry>, Vec<(u32, ViewKind)>)> {
    let mut entries = Vec::with_capacity(bindings.len());
    let mut views = Vec::with_capacity(bindings.len());

    for b in bindings {
        let entry = directory
            .entry(b.descriptor)
            .map_err(|e| GpuError::init(format!("binding {}: {e}", b.binding)))?;
        let ty = match entry.view {
            ViewKind::StorageImage => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: IMAGE_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            ViewKind::UniformBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: None,
            },
            ViewKind::SampledImage => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            ViewKind::RenderTarget => {
                return Err(GpuError::init(format!(
                    "binding {}: render-target views cannot be bound to shaders",
                    b.binding
                )));
            }
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: b.binding,
            visibility,
            ty,
            count: None,
        });
        views.push((b.binding, entry.view));
    }

    Ok((entries, views))
}

fn to_color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: c[0] as f64,
        g: c[1] as f64,
        b: c[2] as f64,
        a: c[3] as f64,
    }
}

impl WgpuBackend<'_> {
    /// Encodes one closed command buffer, in recording order.
    pub(super) fn encode(&mut self, buffer: &CommandBuffer) -> GpuResult<wgpu::CommandBuffer> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen frame encoder"),
            });

        let mut program: Option<ProgramRef> = None;
        let mut tables: BTreeMap<u32, DescriptorIndex> = BTreeMap::new();

        for command in buffer.commands() {
            match command {
                Command::Barriers(barriers) => {
                    for b in barriers {
                        self.check_barrier(b)?;
                    }
                }

                Command::ClearRenderTarget { view, color } => {
                    let target = self.texture_view(*view)?;
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("lumen clear"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: target,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(to_color(*color)),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                }

                Command::BindKernel(id) => {
                    program = Some(ProgramRef::Kernel(*id));
                    tables.clear();
                }

                Command::BindPipeline(id) => {
                    program = Some(ProgramRef::Raster(*id));
                    tables.clear();
                }

                Command::BindTable {
                    binding,
                    descriptor,
                } => {
                    tables.insert(*binding, *descriptor);
                }

                Command::Dispatch { groups } => {
                    let Some(ProgramRef::Kernel(id)) = program else {
                        return Err(GpuError::api("dispatch", "no kernel bound"));
                    };
                    let key = self.prepare_bind_group(ProgramRef::Kernel(id), &tables)?;
                    let offsets = self.dynamic_offsets(&tables, buffer.slot())?;
                    let kernel = self.kernel(id)?;

                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(kernel.label.as_str()),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&kernel.pipeline);
                    if let Some(group) = key.as_ref().and_then(|k| self.bind_groups.get(k)) {
                        pass.set_bind_group(0, group, &offsets);
                    }
                    pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
                }

                Command::Draw {
                    target,
                    vertices,
                    instances,
                } => {
                    let Some(ProgramRef::Raster(id)) = program else {
                        return Err(GpuError::api("draw", "no pipeline bound"));
                    };
                    let key = self.prepare_bind_group(ProgramRef::Raster(id), &tables)?;
                    let offsets = self.dynamic_offsets(&tables, buffer.slot())?;
                    let raster = self.raster(id)?;
                    let view = self.texture_view(*target)?;

                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(raster.label.as_str()),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    pass.set_pipeline(&raster.pipeline);
                    if let Some(group) = key.as_ref().and_then(|k| self.bind_groups.get(k)) {
                        pass.set_bind_group(0, group, &offsets);
                    }
                    pass.draw(vertices.clone(), instances.clone());
                }

                Command::CopyImage {
                    source,
                    destination,
                } => {
                    let src = self.texture(*source)?;
                    let dst = self.texture(*destination)?;
                    if src.size() != dst.size() {
                        return Err(GpuError::api(
                            "copy",
                            format!("extent mismatch {:?} vs {:?}", src.size(), dst.size()),
                        ));
                    }
                    encoder.copy_texture_to_texture(
                        src.as_image_copy(),
                        dst.as_image_copy(),
                        src.size(),
                    );
                }
            }
        }

        Ok(encoder.finish())
    }

    fn check_barrier(&self, barrier: &Barrier) -> GpuResult<()> {
        let known = self.images.contains_key(&barrier.resource)
            || self.buffers.contains_key(&barrier.resource);
        if !known {
            return Err(GpuError::api(
                "barrier",
                format!("unknown resource in {barrier}"),
            ));
        }
        log::trace!("barrier {barrier}");
        Ok(())
    }

    fn kernel(&self, id: KernelId) -> GpuResult<&GpuProgram<wgpu::ComputePipeline>> {
        self.kernels
            .get(id.0 as usize)
            .ok_or_else(|| GpuError::api("bind", format!("unknown kernel {}", id.0)))
    }

    fn raster(&self, id: PipelineId) -> GpuResult<&GpuProgram<wgpu::RenderPipeline>> {
        self.rasters
            .get(id.0 as usize)
            .ok_or_else(|| GpuError::api("bind", format!("unknown pipeline {}", id.0)))
    }

    fn program_layout(
        &self,
        program: ProgramRef,
    ) -> GpuResult<(Option<wgpu::BindGroupLayout>, &[(u32, ViewKind)], &str)> {
        Ok(match program {
            ProgramRef::Kernel(id) => {
                let k = self.kernel(id)?;
                (k.layout.clone(), &k.views, &k.label)
            }
            ProgramRef::Raster(id) => {
                let r = self.raster(id)?;
                (r.layout.clone(), &r.views, &r.label)
            }
        })
    }

    /// Ensures a bind group exists for the currently bound tables.
    fn prepare_bind_group(
        &mut self,
        program: ProgramRef,
        tables: &BTreeMap<u32, DescriptorIndex>,
    ) -> GpuResult<Option<BindGroupKey>> {
        let (layout, views, label) = self.program_layout(program)?;
        let expected: Vec<u32> = views.iter().map(|(b, _)| *b).collect();
        let bound: Vec<u32> = tables.keys().copied().collect();
        let mut sorted = expected.clone();
        sorted.sort_unstable();
        if sorted != bound {
            return Err(GpuError::api(
                "bind",
                format!("`{label}` expects bindings {expected:?}, got {bound:?}"),
            ));
        }
        let Some(layout) = layout else {
            return Ok(None);
        };

        let key = BindGroupKey {
            program,
            tables: tables.iter().map(|(b, d)| (*b, *d)).collect(),
        };
        if self.bind_groups.contains_key(&key) {
            return Ok(Some(key));
        }

        let group = {
            let directory = self.installed_directory()?;
            let mut entries = Vec::with_capacity(tables.len());
            for (binding, descriptor) in tables {
                let entry = directory.entry(*descriptor)?;
                let resource = match entry.view {
                    ViewKind::UniformBuffer => {
                        let buf = self.buffers.get(&entry.resource).ok_or_else(|| {
                            GpuError::api("bind", format!("{descriptor:?} has no buffer"))
                        })?;
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &buf.buffer,
                            offset: 0,
                            size: NonZeroU64::new(buf.region_size),
                        })
                    }
                    ViewKind::StorageImage | ViewKind::SampledImage => {
                        wgpu::BindingResource::TextureView(self.texture_view(*descriptor)?)
                    }
                    ViewKind::RenderTarget => {
                        return Err(GpuError::api(
                            "bind",
                            format!("{descriptor:?} is a render-target view"),
                        ));
                    }
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource,
                });
            }
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lumen tables"),
                layout: &layout,
                entries: &entries,
            })
        };

        self.bind_groups.insert(key.clone(), group);
        Ok(Some(key))
    }

    /// Per-slot offsets for every uniform binding, in binding order.
    fn dynamic_offsets(
        &self,
        tables: &BTreeMap<u32, DescriptorIndex>,
        slot: SlotIndex,
    ) -> GpuResult<Vec<u32>> {
        let directory = self.installed_directory()?;
        let mut offsets = Vec::new();
        for descriptor in tables.values() {
            let entry = directory.entry(*descriptor)?;
            if entry.view != ViewKind::UniformBuffer {
                continue;
            }
            let buf = self
                .buffers
                .get(&entry.resource)
                .ok_or_else(|| GpuError::api("bind", format!("{descriptor:?} has no buffer")))?;
            let offset = slot.get() as u64 * buf.region_size;
            offsets.push(
                u32::try_from(offset)
                    .map_err(|_| GpuError::api("bind", "uniform offset overflows u32"))?,
            );
        }
        Ok(offsets)
    }

    fn texture(&self, index: DescriptorIndex) -> GpuResult<&wgpu::Texture> {
        let entry = self.installed_directory()?.entry(index)?;
        let image = self
            .images
            .get(&entry.resource)
            .ok_or_else(|| GpuError::api("resolve", format!("{index:?} names no image")))?;

        if image.desc.role == ImageRole::Swapchain {
            return self
                .acquired
                .as_ref()
                .filter(|a| a.image == entry.resource)
                .map(|a| &a.texture.texture)
                .ok_or_else(|| GpuError::precondition("swapchain image used before acquire"));
        }
        image
            .texture
            .as_ref()
            .ok_or_else(|| GpuError::api("resolve", format!("{index:?} has no texture")))
    }

    fn texture_view(&self, index: DescriptorIndex) -> GpuResult<&wgpu::TextureView> {
        let entry = self.installed_directory()?.entry(index)?;
        let image = self
            .images
            .get(&entry.resource)
            .ok_or_else(|| GpuError::api("resolve", format!("{index:?} names no image")))?;

        if image.desc.role == ImageRole::Swapchain {
            return self
                .acquired
                .as_ref()
                .filter(|a| a.image == entry.resource)
                .map(|a| &a.view)
                .ok_or_else(|| GpuError::precondition("swapchain image used before acquire"));
        }
        image
            .view
            .as_ref()
            .ok_or_else(|| GpuError::api("resolve", format!("{index:?} has no view")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{COMPUTE_OUTPUT_VIEW, DirectoryLayout, swapchain_view, UNIFORM_VIEW};
    use crate::resource::ResourceId;

    fn directory() -> DescriptorDirectory {
        let mut dir = DescriptorDirectory::new(DirectoryLayout::for_slots(1));
        dir.assign(COMPUTE_OUTPUT_VIEW, ResourceId::from_raw(1), ViewKind::StorageImage)
            .unwrap();
        dir.assign(UNIFORM_VIEW, ResourceId::from_raw(2), ViewKind::UniformBuffer)
            .unwrap();
        dir.assign(swapchain_view(0), ResourceId::from_raw(0), ViewKind::RenderTarget)
            .unwrap();
        dir.seal();
        dir
    }

    #[test]
    fn layout_follows_view_kinds() {
        let bindings = [
            TableBinding {
                binding: 0,
                descriptor: COMPUTE_OUTPUT_VIEW,
            },
            TableBinding {
                binding: 1,
                descriptor: UNIFORM_VIEW,
            },
        ];
        let (entries, views) =
            layout_entries(&directory(), &bindings, wgpu::ShaderStages::COMPUTE).unwrap();

        assert!(matches!(
            entries[0].ty,
            wgpu::BindingType::StorageTexture { .. }
        ));
        assert!(matches!(
            entries[1].ty,
            wgpu::BindingType::Buffer {
                has_dynamic_offset: true,
                ..
            }
        ));
        assert_eq!(
            views,
            vec![(0, ViewKind::StorageImage), (1, ViewKind::UniformBuffer)]
        );
    }

    #[test]
    fn render_target_views_are_not_bindable() {
        let bindings = [TableBinding {
            binding: 0,
            descriptor: swapchain_view(0),
        }];
        let err = layout_entries(&directory(), &bindings, wgpu::ShaderStages::COMPUTE).unwrap_err();
        assert!(matches!(err, GpuError::Init(_)));
    }
}

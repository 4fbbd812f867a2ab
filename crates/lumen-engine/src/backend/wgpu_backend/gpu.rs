use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use winit::window::Window;

use crate::command::CommandBuffer;
use crate::descriptor::{DescriptorDirectory, HeapKind, ViewKind};
use crate::device::{
    Extent, FenceValue, GpuBackend, GpuError, GpuResult, ImageDesc, ImageRole, KernelDesc,
    KernelId, PipelineId, RasterPipelineDesc, UniformBufferDesc,
};
use crate::frame::SlotIndex;
use crate::resource::ResourceId;

use super::encode::{BindGroupKey, GpuProgram, layout_entries, premul_alpha_blend};
use super::init::WgpuInit;
use super::surface::{
    SurfaceErrorAction, choose_alpha_mode, choose_surface_format, classify_surface_error,
};

/// Texel format of every engine-owned image.
pub(super) const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(super) struct GpuImage {
    pub desc: ImageDesc,
    /// `None` for swapchain images; their texture comes from the surface.
    pub texture: Option<wgpu::Texture>,
    pub view: Option<wgpu::TextureView>,
}

pub(super) struct GpuUniformBuffer {
    pub buffer: wgpu::Buffer,
    pub region_size: u64,
    pub regions: usize,
}

/// The surface texture currently on loan, bound to a swapchain resource.
pub(super) struct AcquiredImage {
    pub image: ResourceId,
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

/// [`GpuBackend`] over a `wgpu` device, queue and window surface.
///
/// `wgpu` tracks resource states itself, so recorded barriers are validated
/// and logged rather than issued. The fence timeline is built from queue
/// submission indices plus `on_submitted_work_done` callbacks.
pub struct WgpuBackend<'w> {
    pub(super) window: &'w Window,
    pub(super) surface: wgpu::Surface<'w>,
    pub(super) device: wgpu::Device,
    pub(super) queue: wgpu::Queue,
    pub(super) config: wgpu::SurfaceConfiguration,
    pub(super) extent: Extent,

    pub(super) images: HashMap<ResourceId, GpuImage>,
    pub(super) buffers: HashMap<ResourceId, GpuUniformBuffer>,
    pub(super) acquired: Option<AcquiredImage>,
    pub(super) directory: Option<DescriptorDirectory>,
    pub(super) kernels: Vec<GpuProgram<wgpu::ComputePipeline>>,
    pub(super) rasters: Vec<GpuProgram<wgpu::RenderPipeline>>,
    pub(super) bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,

    /// Queue submission that carries each signaled fence value.
    submissions: BTreeMap<u64, wgpu::SubmissionIndex>,
    /// Highest value whose work-done callback has fired.
    completed: Arc<AtomicU64>,
}

impl<'w> WgpuBackend<'w> {
    /// Creates the device, queue and surface for `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: WgpuInit) -> GpuResult<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(GpuError::init("window has zero size"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| GpuError::init(format!("failed to create wgpu surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::init(format!("failed to find a suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumen device"),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GpuError::init(format!("failed to create wgpu device/queue: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps).ok_or_else(|| {
            GpuError::init(format!(
                "surface offers no RGBA8 format to copy into (available: {:?})",
                caps.formats
            ))
        })?;
        if !caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(GpuError::init("surface textures cannot be copy destinations"));
        }

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode: choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);
        log::info!(
            "surface configured: {}x{} {:?} {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            extent: Extent::new(size.width, size.height),
            images: HashMap::new(),
            buffers: HashMap::new(),
            acquired: None,
            directory: None,
            kernels: Vec::new(),
            rasters: Vec::new(),
            bind_groups: HashMap::new(),
            submissions: BTreeMap::new(),
            completed: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub(super) fn installed_directory(&self) -> GpuResult<&DescriptorDirectory> {
        self.directory
            .as_ref()
            .ok_or_else(|| GpuError::precondition("descriptor directory not installed"))
    }

    fn check_install(&self, directory: &DescriptorDirectory) -> GpuResult<()> {
        for heap in HeapKind::ALL {
            for (index, entry) in directory.iter(heap) {
                let role = self.images.get(&entry.resource).map(|i| i.desc.role);
                let fits = match entry.view {
                    ViewKind::StorageImage => role == Some(ImageRole::ComputeOutput),
                    ViewKind::SampledImage => matches!(
                        role,
                        Some(ImageRole::ComputeOutput | ImageRole::RenderTarget)
                    ),
                    ViewKind::RenderTarget => {
                        matches!(role, Some(ImageRole::Swapchain | ImageRole::RenderTarget))
                    }
                    ViewKind::UniformBuffer => self.buffers.contains_key(&entry.resource),
                };
                if !fits {
                    return Err(GpuError::init(format!(
                        "descriptor {index:?}: {:?} view does not fit resource #{}",
                        entry.view,
                        entry.resource.raw()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl GpuBackend for WgpuBackend<'_> {
    fn surface_extent(&self) -> Extent {
        self.extent
    }

    fn create_image(&mut self, id: ResourceId, desc: &ImageDesc) -> GpuResult<()> {
        if desc.extent != self.extent {
            return Err(GpuError::init(format!(
                "{}: {}x{} does not match the surface",
                desc.label, desc.extent.width, desc.extent.height
            )));
        }

        let usage = match desc.role {
            ImageRole::Swapchain => {
                self.images.insert(
                    id,
                    GpuImage {
                        desc: desc.clone(),
                        texture: None,
                        view: None,
                    },
                );
                return Ok(());
            }
            ImageRole::ComputeOutput => {
                wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::TEXTURE_BINDING
            }
            ImageRole::RenderTarget => {
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
            }
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.extent.width,
                height: desc.extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::info!(
            "created {} ({}x{})",
            desc.label,
            desc.extent.width,
            desc.extent.height
        );

        self.images.insert(
            id,
            GpuImage {
                desc: desc.clone(),
                texture: Some(texture),
                view: Some(view),
            },
        );
        Ok(())
    }

    fn create_uniform_buffer(&mut self, id: ResourceId, desc: &UniformBufferDesc) -> GpuResult<()> {
        let alignment = u64::from(self.device.limits().min_uniform_buffer_offset_alignment);
        if desc.region_size % alignment != 0 {
            return Err(GpuError::init(format!(
                "{}: region size {} is not a multiple of {alignment}",
                desc.label, desc.region_size
            )));
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.region_size * desc.regions as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers.insert(
            id,
            GpuUniformBuffer {
                buffer,
                region_size: desc.region_size,
                regions: desc.regions,
            },
        );
        Ok(())
    }

    fn install_descriptors(&mut self, directory: &DescriptorDirectory) -> GpuResult<()> {
        if !directory.is_sealed() {
            return Err(GpuError::init("descriptor directory installed before sealing"));
        }
        self.check_install(directory)?;
        self.directory = Some(directory.clone());
        log::info!(
            "descriptor tables installed: {} shader-visible, {} render-target",
            directory.iter(HeapKind::ShaderVisible).count(),
            directory.iter(HeapKind::RenderTarget).count()
        );
        Ok(())
    }

    fn create_kernel(&mut self, desc: &KernelDesc<'_>) -> GpuResult<KernelId> {
        let (entries, views) = layout_entries(
            self.installed_directory()?,
            desc.bindings,
            wgpu::ShaderStages::COMPUTE,
        )?;

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&layout],
                immediate_size: 0,
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(desc.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(GpuProgram {
            label: desc.label.to_string(),
            pipeline,
            layout: Some(layout),
            views,
        });
        log::info!("compiled kernel `{}`", desc.label);
        Ok(id)
    }

    fn create_raster_pipeline(&mut self, desc: &RasterPipelineDesc<'_>) -> GpuResult<PipelineId> {
        let (entries, views) = layout_entries(
            self.installed_directory()?,
            desc.bindings,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
        )?;

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });
        let layout = (!entries.is_empty()).then(|| {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(desc.label),
                    entries: &entries,
                })
        });
        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = layout.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &bind_group_layouts,
                immediate_size: 0,
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(desc.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(desc.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: IMAGE_FORMAT,
                        blend: Some(premul_alpha_blend()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let id = PipelineId(self.rasters.len() as u32);
        self.rasters.push(GpuProgram {
            label: desc.label.to_string(),
            pipeline,
            layout,
            views,
        });
        log::info!("created raster pipeline `{}`", desc.label);
        Ok(id)
    }

    fn reset_allocator(&mut self, slot: SlotIndex) -> GpuResult<()> {
        // Encoders are created per submission; nothing is pooled per slot.
        log::trace!("slot {slot}: allocator reset");
        Ok(())
    }

    fn acquire_swapchain_image(&mut self, image: ResourceId) -> GpuResult<()> {
        if self.acquired.is_some() {
            return Err(GpuError::precondition(
                "previous swapchain image was never presented",
            ));
        }
        match self.images.get(&image) {
            Some(img) if img.desc.role == ImageRole::Swapchain => {}
            _ => {
                return Err(GpuError::precondition(format!(
                    "#{} is not a swapchain image",
                    image.raw()
                )));
            }
        }

        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) if classify_surface_error(&err) == SurfaceErrorAction::Reconfigure => {
                log::warn!("surface {err}; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|e| GpuError::api("acquire", e))?
            }
            Err(err) => return Err(GpuError::api("acquire", err)),
        };
        if texture.suboptimal {
            log::debug!("surface texture is suboptimal");
        }

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.acquired = Some(AcquiredImage {
            image,
            texture,
            view,
        });
        Ok(())
    }

    fn write_uniforms(&mut self, buffer: ResourceId, slot: SlotIndex, bytes: &[u8]) -> GpuResult<()> {
        let target = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| GpuError::precondition(format!("unknown buffer #{}", buffer.raw())))?;
        if bytes.len() as u64 > target.region_size || slot.get() >= target.regions {
            return Err(GpuError::precondition(format!(
                "uniform write of {} bytes outside slot {slot}'s region",
                bytes.len()
            )));
        }
        self.queue
            .write_buffer(&target.buffer, slot.get() as u64 * target.region_size, bytes);
        Ok(())
    }

    fn submit(&mut self, buffers: &[CommandBuffer]) -> GpuResult<()> {
        let mut encoded = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            encoded.push(self.encode(buffer)?);
        }
        self.queue.submit(encoded);
        Ok(())
    }

    fn signal(&mut self, value: FenceValue) -> GpuResult<()> {
        let index = self.queue.submit(std::iter::empty());
        let completed = Arc::clone(&self.completed);
        let raw = value.get();
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(raw, Ordering::AcqRel);
        });
        prune_completed(
            &mut self.submissions,
            self.completed.load(Ordering::Acquire),
        );
        self.submissions.insert(raw, index);
        Ok(())
    }

    fn completed_value(&self) -> GpuResult<FenceValue> {
        self.device
            .poll(wgpu::PollType::Poll)
            .map_err(|e| GpuError::api("poll", e))?;
        Ok(FenceValue::new(self.completed.load(Ordering::Acquire)))
    }

    fn wait_for(&mut self, value: FenceValue) -> GpuResult<()> {
        let Some(index) = self.submissions.get(&value.get()).cloned() else {
            if self.completed.load(Ordering::Acquire) >= value.get() {
                return Ok(());
            }
            return Err(GpuError::FenceWait {
                value,
                reason: "no submission carries this value".to_string(),
            });
        };

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| GpuError::FenceWait {
                value,
                reason: e.to_string(),
            })?;

        self.completed.fetch_max(value.get(), Ordering::AcqRel);
        prune_completed(&mut self.submissions, value.get());
        Ok(())
    }

    fn present(&mut self, image: ResourceId) -> GpuResult<()> {
        let acquired = self
            .acquired
            .take()
            .ok_or_else(|| GpuError::precondition("present without an acquired image"))?;
        if acquired.image != image {
            return Err(GpuError::precondition(format!(
                "present of #{} but #{} was acquired",
                image.raw(),
                acquired.image.raw()
            )));
        }

        self.window.pre_present_notify();
        drop(acquired.view);
        acquired.texture.present();
        Ok(())
    }
}

/// Drops the submissions the GPU has already passed. Only values still in
/// flight keep an entry, so the map never outgrows the pipeline depth.
fn prune_completed<T>(submissions: &mut BTreeMap<u64, T>, completed: u64) {
    submissions.retain(|value, _| *value > completed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pruning_keeps_only_values_in_flight() {
        let mut submissions: BTreeMap<u64, ()> = (1..=5).map(|v| (v, ())).collect();
        prune_completed(&mut submissions, 3);
        assert_eq!(submissions.keys().copied().collect::<Vec<_>>(), vec![4, 5]);

        prune_completed(&mut submissions, 3);
        assert_eq!(submissions.len(), 2);
        prune_completed(&mut submissions, 0);
        assert_eq!(submissions.len(), 2);
    }

    #[test]
    fn signalling_without_waits_stays_bounded() {
        // Three frames in flight; the GPU trails the newest signal by two.
        let mut submissions = BTreeMap::new();
        for value in 1..=1000u64 {
            prune_completed(&mut submissions, value.saturating_sub(3));
            submissions.insert(value, ());
            assert!(submissions.len() <= 3, "{} entries at {value}", submissions.len());
        }
        assert_eq!(submissions.keys().copied().collect::<Vec<_>>(), vec![998, 999, 1000]);
    }
}

//! wgpu-backed implementation of the capability set.

mod scope;
mod surface;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::paint::BlendMode;
use crate::{Error, Result};

use super::{
    AcquiredImage, GraphicsBackend, IdSource, PipelineDesc, RawBuffer, RawDescriptorArray,
    RawFrame, RawPipeline, RawResource, RawSwapchain, RawTexture, ShaderStage, SubmitDesc,
    TextureDesc, TextureFormat, UniformLayout, VertexLayout,
};

/// Initialization parameters for the wgpu backend.
///
/// Keep this structure minimal. Add flags only when a concrete platform
/// requirement exists.
#[derive(Debug, Clone)]
pub struct WgpuInit {
    /// Native APIs wgpu may pick from.
    pub backends: wgpu::Backends,

    pub power_preference: wgpu::PowerPreference,

    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// FIFO is broadly supported and appropriate for UI workloads.
    pub present_mode: wgpu::PresentMode,

    /// Used if supported by the surface, otherwise the first supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// A hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}

struct PipelineSlot {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
}

struct TextureSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

struct BufferSlot {
    buffer: wgpu::Buffer,
    capacity: u64,
}

enum SwapchainSlot {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        acquired: u64,
    },
    Offscreen {
        desc: TextureDesc,
        images: Vec<wgpu::Texture>,
        in_flight: Vec<bool>,
        next: usize,
    },
}

struct FrameSlot {
    swapchain: RawSwapchain,
    index: u32,
    view: wgpu::TextureView,
    /// Present happens by calling `present()` on this; dropping it discards.
    surface_texture: Option<wgpu::SurfaceTexture>,
}

/// Owns the wgpu instance, adapter, device and queue plus every object
/// created through the capability set.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    init: WgpuInit,
    sampler: wgpu::Sampler,
    lost: Arc<AtomicBool>,

    ids: IdSource,
    pipelines: HashMap<RawPipeline, PipelineSlot>,
    textures: HashMap<RawTexture, TextureSlot>,
    descriptors: HashMap<RawDescriptorArray, wgpu::BindGroup>,
    buffers: HashMap<RawBuffer, BufferSlot>,
    swapchains: HashMap<RawSwapchain, SwapchainSlot>,
    frames: HashMap<RawFrame, FrameSlot>,
}

impl WgpuBackend {
    /// Creates the instance, adapter, device and queue.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: WgpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::NoDevice(format!("no suitable GPU adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("easel-engine device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| Error::NoDevice(format!("failed to create device/queue: {e}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("easel paint sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            init,
            sampler,
            lost,
            ids: IdSource::default(),
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            descriptors: HashMap::new(),
            buffers: HashMap::new(),
            swapchains: HashMap::new(),
            frames: HashMap::new(),
        })
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Creates a swapchain presenting to `target` and returns it with the
    /// chosen format.
    pub fn create_surface_swapchain(
        &mut self,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<(RawSwapchain, TextureFormat)> {
        self.check_alive()?;

        let surface = self
            .instance
            .create_surface(target)
            .map_err(|e| Error::Backend(format!("failed to create surface: {e}")))?;

        let caps = surface.get_capabilities(&self.adapter);
        let (format, ours) = surface::choose_surface_format(&caps, self.init.prefer_srgb)
            .ok_or(Error::Unsupported("surface has no RGBA8/BGRA8 format"))?;
        let alpha_mode = surface::choose_alpha_mode(&caps, self.init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: self.init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: self.init.desired_maximum_frame_latency,
        };
        surface.configure(&self.device, &config);

        let id = RawSwapchain(self.ids.next());
        self.swapchains.insert(
            id,
            SwapchainSlot::Surface {
                surface,
                config,
                acquired: 0,
            },
        );
        log::debug!("surface swapchain {id:?}: {format:?} {width}x{height}");
        Ok((id, ours))
    }

    fn check_alive(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            Err(Error::NoDevice("wgpu device was lost".to_string()))
        } else {
            Ok(())
        }
    }

    fn write_full_texture(&self, slot: &TextureSlot, pixels: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(slot.desc.width * slot.desc.format.bytes_per_texel() as u32),
                rows_per_image: Some(slot.desc.height),
            },
            wgpu::Extent3d {
                width: slot.desc.width,
                height: slot.desc.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_image(&self, desc: &TextureDesc, label: &str, usage: wgpu::TextureUsages) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: surface::to_wgpu_format(desc.format),
            usage,
            view_formats: &[],
        })
    }

    fn acquire_surface(
        &mut self,
        swapchain: RawSwapchain,
        timeout: Duration,
    ) -> Result<(wgpu::SurfaceTexture, u32)> {
        let Some(SwapchainSlot::Surface { surface, config, acquired }) =
            self.swapchains.get_mut(&swapchain)
        else {
            return Err(Error::Backend(format!("unknown surface swapchain {swapchain:?}")));
        };

        let start = Instant::now();
        let mut reconfigured = false;
        let texture = loop {
            match surface.get_current_texture() {
                Ok(texture) => break texture,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) if !reconfigured => {
                    log::debug!("surface {swapchain:?} lost/outdated; reconfiguring");
                    surface.configure(&self.device, config);
                    reconfigured = true;
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    return Err(Error::FrameAcquireTimeout(timeout));
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    return Err(Error::NoDevice("out of memory acquiring a frame".to_string()));
                }
                Err(err @ (wgpu::SurfaceError::Lost
                | wgpu::SurfaceError::Outdated
                | wgpu::SurfaceError::Other)) => {
                    return Err(Error::Backend(format!("surface error: {err}")));
                }
            }
        };

        // wgpu bounds the wait internally; an overrun is reported as a timeout
        // so callers never see a cycle longer than they asked for.
        if start.elapsed() > timeout {
            log::warn!("frame acquire took {:?} (bound {timeout:?})", start.elapsed());
            drop(texture);
            return Err(Error::FrameAcquireTimeout(timeout));
        }

        let index = (*acquired % u64::from(config.desired_maximum_frame_latency.max(1) + 1)) as u32;
        *acquired += 1;
        Ok((texture, index))
    }
}

fn validate_wgsl(stage: &ShaderStage<'_>) -> std::result::Result<(), String> {
    let module = naga::front::wgsl::parse_str(stage.source)
        .map_err(|e| format!("{}: {}", stage.label, e.emit_to_string(stage.source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| format!("{}: {e}", stage.label))?;

    if !module.entry_points.iter().any(|ep| ep.name == stage.entry_point) {
        return Err(format!("{}: missing entry point `{}`", stage.label, stage.entry_point));
    }
    Ok(())
}

fn blend_state(blend: BlendMode) -> wgpu::BlendState {
    let over = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    match blend {
        BlendMode::SourceOver => wgpu::BlendState { color: over, alpha: over },
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState { color: add, alpha: add }
        }
        BlendMode::Multiply => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Dst,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: over,
        },
        BlendMode::Replace => wgpu::BlendState::REPLACE,
    }
}

fn vertex_format(components: u32) -> std::result::Result<wgpu::VertexFormat, String> {
    match components {
        1 => Ok(wgpu::VertexFormat::Float32),
        2 => Ok(wgpu::VertexFormat::Float32x2),
        3 => Ok(wgpu::VertexFormat::Float32x3),
        4 => Ok(wgpu::VertexFormat::Float32x4),
        n => Err(format!("unsupported attribute width {n}")),
    }
}

fn vertex_attributes(layout: &VertexLayout) -> std::result::Result<Vec<wgpu::VertexAttribute>, String> {
    layout
        .attributes
        .iter()
        .map(|a| {
            Ok(wgpu::VertexAttribute {
                format: vertex_format(a.components)?,
                offset: a.offset,
                shader_location: a.location,
            })
        })
        .collect()
}

impl GraphicsBackend for WgpuBackend {
    fn label(&self) -> &'static str {
        "wgpu"
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<RawPipeline> {
        self.check_alive()?;
        let fail = |reason: String| Error::PipelineCompileFailed { kind: desc.kind, reason };

        validate_wgsl(&desc.vertex).map_err(fail)?;
        if desc.fragment.source != desc.vertex.source {
            validate_wgsl(&desc.fragment).map_err(fail)?;
        }
        let attributes = vertex_attributes(desc.vertex_layout).map_err(fail)?;

        let (pipeline, bind_group_layout) = scope::validated(&self.device, desc.label, || {
            let vs = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.vertex.label),
                source: wgpu::ShaderSource::Wgsl(desc.vertex.source.into()),
            });
            let separate_fs = (desc.fragment.source != desc.vertex.source).then(|| {
                self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.fragment.label),
                    source: wgpu::ShaderSource::Wgsl(desc.fragment.source.into()),
                })
            });
            let fs = separate_fs.as_ref().unwrap_or(&vs);

            let bind_group_layout = match desc.uniform_layout {
                UniformLayout::Empty => None,
                UniformLayout::SingleTexture => Some(self.device.create_bind_group_layout(
                    &wgpu::BindGroupLayoutDescriptor {
                        label: Some("easel textured paint bgl"),
                        entries: &[
                            wgpu::BindGroupLayoutEntry {
                                binding: 0,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Texture {
                                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                    view_dimension: wgpu::TextureViewDimension::D2,
                                    multisampled: false,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 1,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                                count: None,
                            },
                        ],
                    },
                )),
            };

            let layouts: Vec<&wgpu::BindGroupLayout> = bind_group_layout.iter().collect();
            let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            });

            // Target shape is baked in through WGSL override constants.
            let constants = [
                ("target_width", f64::from(desc.width.max(1))),
                ("target_height", f64::from(desc.height.max(1))),
            ];

            let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vs,
                    entry_point: Some(desc.vertex.entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &constants,
                        zero_initialize_workgroup_memory: true,
                    },
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: desc.vertex_layout.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: fs,
                    entry_point: Some(desc.fragment.entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &constants,
                        zero_initialize_workgroup_memory: true,
                    },
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface::to_wgpu_format(desc.pass.format),
                        blend: Some(blend_state(desc.blend)),
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
            (pipeline, bind_group_layout)
        })
        .map_err(fail)?;

        let id = RawPipeline(self.ids.next());
        self.pipelines.insert(
            id,
            PipelineSlot {
                pipeline,
                bind_group_layout,
            },
        );
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<RawTexture> {
        self.check_alive()?;
        if pixels.len() != desc.byte_len() {
            return Err(Error::PixelSizeMismatch {
                expected: desc.byte_len(),
                actual: pixels.len(),
            });
        }
        let slot = scope::validated(&self.device, "easel texture", || {
            let texture = self.create_image(
                desc,
                "easel texture",
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let slot = TextureSlot { texture, view, desc: *desc };
            self.write_full_texture(&slot, pixels);
            slot
        })
        .map_err(Error::Backend)?;

        let id = RawTexture(self.ids.next());
        self.textures.insert(id, slot);
        Ok(id)
    }

    fn upload_texture(&mut self, texture: RawTexture, pixels: &[u8]) -> Result<()> {
        self.check_alive()?;
        let slot = self
            .textures
            .get(&texture)
            .ok_or_else(|| Error::Backend(format!("unknown texture {texture:?}")))?;
        if pixels.len() != slot.desc.byte_len() {
            return Err(Error::PixelSizeMismatch {
                expected: slot.desc.byte_len(),
                actual: pixels.len(),
            });
        }
        self.write_full_texture(slot, pixels);
        Ok(())
    }

    fn create_descriptor_array(
        &mut self,
        pipeline: RawPipeline,
        texture: RawTexture,
    ) -> Result<RawDescriptorArray> {
        self.check_alive()?;
        let bgl = self
            .pipelines
            .get(&pipeline)
            .and_then(|p| p.bind_group_layout.as_ref())
            .ok_or_else(|| Error::Backend(format!("pipeline {pipeline:?} has no texture binding")))?;
        let view = &self
            .textures
            .get(&texture)
            .ok_or_else(|| Error::Backend(format!("unknown texture {texture:?}")))?
            .view;

        let bind_group = scope::validated(&self.device, "easel paint bind group", || {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("easel paint bind group"),
                layout: bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            })
        })
        .map_err(Error::Backend)?;

        let id = RawDescriptorArray(self.ids.next());
        self.descriptors.insert(id, bind_group);
        Ok(id)
    }

    fn create_vertex_buffer(&mut self, capacity: u64) -> Result<RawBuffer> {
        self.check_alive()?;
        let capacity = capacity.max(wgpu::COPY_BUFFER_ALIGNMENT).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("easel paint vbo"),
            size: capacity,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = RawBuffer(self.ids.next());
        self.buffers.insert(id, BufferSlot { buffer, capacity });
        Ok(id)
    }

    fn upload_vertex_buffer(&mut self, buffer: RawBuffer, data: &[u8]) -> Result<()> {
        self.check_alive()?;
        let slot = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| Error::Backend(format!("unknown vertex buffer {buffer:?}")))?;
        if data.len() as u64 > slot.capacity {
            return Err(Error::Backend(format!(
                "{} bytes do not fit a {}-byte vertex buffer",
                data.len(),
                slot.capacity
            )));
        }
        if !data.is_empty() {
            self.queue.write_buffer(&slot.buffer, 0, data);
        }
        Ok(())
    }

    fn create_offscreen_swapchain(
        &mut self,
        desc: &TextureDesc,
        image_count: u32,
    ) -> Result<RawSwapchain> {
        self.check_alive()?;
        let count = if image_count == 0 { 2 } else { image_count } as usize;
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let images = (0..count)
            .map(|_| self.create_image(desc, "easel offscreen image", usage))
            .collect();

        let id = RawSwapchain(self.ids.next());
        self.swapchains.insert(
            id,
            SwapchainSlot::Offscreen {
                desc: *desc,
                images,
                in_flight: vec![false; count],
                next: 0,
            },
        );
        Ok(id)
    }

    fn resize_swapchain(
        &mut self,
        swapchain: RawSwapchain,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.check_alive()?;
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;

        let new_images = match self.swapchains.get(&swapchain) {
            Some(SwapchainSlot::Offscreen { desc, images, .. }) => {
                let desc = TextureDesc { width, height, ..*desc };
                Some((desc, (0..images.len())
                    .map(|_| self.create_image(&desc, "easel offscreen image", usage))
                    .collect::<Vec<_>>()))
            }
            Some(SwapchainSlot::Surface { .. }) => None,
            None => return Err(Error::Backend(format!("unknown swapchain {swapchain:?}"))),
        };

        match (self.swapchains.get_mut(&swapchain), new_images) {
            (Some(SwapchainSlot::Surface { surface, config, .. }), _) => {
                surface::apply_resize(surface, &self.device, config, width, height);
            }
            (Some(SwapchainSlot::Offscreen { desc, images, in_flight, next }), Some((new_desc, new))) => {
                *desc = new_desc;
                *images = new;
                in_flight.iter_mut().for_each(|slot| *slot = false);
                *next = 0;
            }
            _ => {}
        }
        Ok(())
    }

    fn acquire_frame(
        &mut self,
        swapchain: RawSwapchain,
        timeout: Duration,
    ) -> Result<AcquiredImage> {
        self.check_alive()?;

        let is_surface = matches!(
            self.swapchains.get(&swapchain),
            Some(SwapchainSlot::Surface { .. })
        );

        let (view, index, surface_texture) = if is_surface {
            let (texture, index) = self.acquire_surface(swapchain, timeout)?;
            let view = texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            (view, index, Some(texture))
        } else {
            let Some(SwapchainSlot::Offscreen { images, in_flight, next, .. }) =
                self.swapchains.get_mut(&swapchain)
            else {
                return Err(Error::Backend(format!("unknown swapchain {swapchain:?}")));
            };
            let len = images.len();
            let Some(index) = (0..len).map(|i| (*next + i) % len).find(|&i| !in_flight[i]) else {
                // Images are retired on this thread only; waiting cannot help.
                return Err(Error::FrameAcquireTimeout(timeout));
            };
            in_flight[index] = true;
            *next = (index + 1) % len;
            let view = images[index].create_view(&wgpu::TextureViewDescriptor::default());
            (view, index as u32, None)
        };

        let frame = RawFrame(self.ids.next());
        self.frames.insert(
            frame,
            FrameSlot {
                swapchain,
                index,
                view,
                surface_texture,
            },
        );
        Ok(AcquiredImage { frame, index })
    }

    fn submit(&mut self, frame: RawFrame, desc: &SubmitDesc<'_>) -> Result<()> {
        self.check_alive()?;
        let slot = self
            .frames
            .get(&frame)
            .ok_or_else(|| Error::Backend(format!("unknown frame {frame:?}")))?;

        let vertex_buffer = match desc.vertex_buffer {
            Some(id) => Some(
                &self
                    .buffers
                    .get(&id)
                    .ok_or_else(|| Error::Backend(format!("unknown vertex buffer {id:?}")))?
                    .buffer,
            ),
            None => None,
        };

        // Resolve every id before recording so a bad draw leaves no half-built pass.
        let mut draws = Vec::with_capacity(desc.draws.len());
        for draw in desc.draws {
            let pipeline = &self
                .pipelines
                .get(&draw.pipeline)
                .ok_or_else(|| Error::Backend(format!("unknown pipeline {:?}", draw.pipeline)))?
                .pipeline;
            let bind_group = match draw.descriptors {
                Some(d) => Some(
                    self.descriptors
                        .get(&d)
                        .ok_or_else(|| Error::Backend(format!("unknown descriptor array {d:?}")))?,
                ),
                None => None,
            };
            if vertex_buffer.is_none() && draw.vertex_count > 0 {
                return Err(Error::Backend("draw without a vertex buffer".to_string()));
            }
            draws.push((pipeline, bind_group, draw.first_vertex..draw.first_vertex + draw.vertex_count));
        }

        let load = match desc.clear {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.r as f64,
                g: c.g as f64,
                b: c.b as f64,
                a: c.a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("easel frame encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("easel paint pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &slot.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(vbo) = vertex_buffer {
                rpass.set_vertex_buffer(0, vbo.slice(..));
            }
            for (pipeline, bind_group, range) in draws {
                rpass.set_pipeline(pipeline);
                if let Some(bind_group) = bind_group {
                    rpass.set_bind_group(0, bind_group, &[]);
                }
                rpass.draw(range, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn present(&mut self, frame: RawFrame) -> Result<()> {
        let slot = self
            .frames
            .remove(&frame)
            .ok_or_else(|| Error::Backend(format!("unknown frame {frame:?}")))?;
        match slot.surface_texture {
            Some(texture) => texture.present(),
            None => self.retire_offscreen(slot.swapchain, slot.index),
        }
        Ok(())
    }

    fn destroy(&mut self, resource: RawResource) {
        match resource {
            RawResource::Pipeline(id) => {
                self.pipelines.remove(&id);
            }
            RawResource::Texture(id) => {
                if let Some(slot) = self.textures.remove(&id) {
                    slot.texture.destroy();
                }
            }
            RawResource::DescriptorArray(id) => {
                self.descriptors.remove(&id);
            }
            RawResource::VertexBuffer(id) => {
                if let Some(slot) = self.buffers.remove(&id) {
                    slot.buffer.destroy();
                }
            }
            RawResource::Swapchain(id) => {
                self.frames.retain(|_, f| f.swapchain != id);
                self.swapchains.remove(&id);
            }
            RawResource::Frame(id) => {
                // Dropping an unpresented surface texture discards it.
                if let Some(slot) = self.frames.remove(&id)
                    && slot.surface_texture.is_none()
                {
                    self.retire_offscreen(slot.swapchain, slot.index);
                }
            }
        }
    }
}

impl WgpuBackend {
    fn retire_offscreen(&mut self, swapchain: RawSwapchain, index: u32) {
        if let Some(SwapchainSlot::Offscreen { in_flight, .. }) = self.swapchains.get_mut(&swapchain)
            && let Some(slot) = in_flight.get_mut(index as usize)
        {
            *slot = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RenderPass;
    use crate::paint::PaintKind;
    use crate::pipeline::PAINT_VERTEX_LAYOUT;

    // Parses and validates on its own, but location 0 is declared as
    // integers while the paint layout feeds floats.
    const MISMATCHED_INPUT: &str = r"
override target_width: f32 = 1.0;
override target_height: f32 = 1.0;

struct VsIn {
    @location(0) position: vec4<u32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
};

@vertex
fn vs_main(v: VsIn) -> @builtin(position) vec4<f32> {
    let p = vec2<f32>(v.position.xy) / vec2<f32>(target_width, target_height);
    return vec4<f32>(p, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
";

    #[test]
    fn wgpu_validation_failure_is_a_compile_error() {
        let mut gpu = match pollster::block_on(WgpuBackend::new(WgpuInit::default())) {
            Ok(gpu) => gpu,
            Err(err) => {
                eprintln!("skipping, no GPU: {err}");
                return;
            }
        };
        let stage = |entry_point: &'static str| ShaderStage {
            label: "mismatched input",
            source: MISMATCHED_INPUT,
            entry_point,
        };
        let desc = PipelineDesc {
            label: "mismatched input pipeline",
            pass: RenderPass::default(),
            kind: PaintKind::Solid,
            blend: BlendMode::SourceOver,
            vertex_layout: &PAINT_VERTEX_LAYOUT,
            uniform_layout: UniformLayout::Empty,
            vertex: stage("vs_main"),
            fragment: stage("fs_main"),
            width: 64,
            height: 64,
        };

        let err = gpu.create_pipeline(&desc).unwrap_err();
        assert!(
            matches!(err, Error::PipelineCompileFailed { kind: PaintKind::Solid, .. }),
            "{err:?}"
        );
        assert!(gpu.pipelines.is_empty());
    }
}

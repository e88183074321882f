//! In-memory backend.
//!
//! Keeps every object on the CPU and records what a GPU would have been asked
//! to do. Used for offscreen runs and as the backend of the test-suite.

use std::collections::HashMap;
use std::time::Duration;

use crate::paint::{BlendMode, Color, PaintKind};
use crate::pipeline::PaintVertex;
use crate::{Error, Result};

use super::{
    AcquiredImage, GraphicsBackend, IdSource, PipelineDesc, RawBuffer, RawDescriptorArray,
    RawFrame, RawPipeline, RawResource, RawSwapchain, RawTexture, RenderPass, SubmitDesc,
    TextureDesc, UniformLayout,
};

/// Headless backend settings.
#[derive(Debug, Clone)]
pub struct HeadlessInit {
    /// Images per swapchain.
    pub image_count: u32,
    /// When false, every acquire waits out its timeout and fails.
    pub responsive: bool,
    /// When true, every pipeline compile fails.
    pub fail_pipeline_compile: bool,
}

impl Default for HeadlessInit {
    fn default() -> Self {
        Self {
            image_count: 2,
            responsive: true,
            fail_pipeline_compile: false,
        }
    }
}

/// What a pipeline was compiled for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PipelineRecord {
    pub pass: RenderPass,
    pub kind: PaintKind,
    pub blend: BlendMode,
    pub uniform_layout: UniformLayout,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
struct TextureRecord {
    desc: TextureDesc,
    pixels: Vec<u8>,
    uploads: u32,
}

#[derive(Debug)]
struct DescriptorRecord {
    texture: RawTexture,
}

#[derive(Debug)]
struct SwapchainRecord {
    desc: TextureDesc,
    in_flight: Vec<bool>,
    next: usize,
}

#[derive(Debug)]
struct FrameRecord {
    swapchain: RawSwapchain,
    index: u32,
}

/// One draw of a recorded submission, with its vertices decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub pipeline: RawPipeline,
    pub kind: PaintKind,
    pub texture: Option<RawTexture>,
    pub vertices: Vec<PaintVertex>,
}

/// One recorded `submit`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub image_index: u32,
    pub clear: Option<Color>,
    pub draws: Vec<RecordedDraw>,
}

/// Lifetime counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub pipelines_compiled: u64,
    pub textures_created: u64,
    pub texture_uploads: u64,
    pub descriptor_arrays_created: u64,
    pub vertex_buffers_created: u64,
    pub frames_acquired: u64,
    pub frames_presented: u64,
    pub destroyed: u64,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    init: HeadlessInit,
    ids: IdSource,
    pipelines: HashMap<RawPipeline, PipelineRecord>,
    textures: HashMap<RawTexture, TextureRecord>,
    descriptors: HashMap<RawDescriptorArray, DescriptorRecord>,
    buffers: HashMap<RawBuffer, Vec<u8>>,
    swapchains: HashMap<RawSwapchain, SwapchainRecord>,
    frames: HashMap<RawFrame, FrameRecord>,
    submissions: Vec<Submission>,
    stats: HeadlessStats,
}

impl HeadlessBackend {
    pub fn new(init: HeadlessInit) -> Self {
        Self {
            init,
            ..Self::default()
        }
    }

    pub fn set_responsive(&mut self, responsive: bool) {
        self.init.responsive = responsive;
    }

    pub fn set_fail_pipeline_compile(&mut self, fail: bool) {
        self.init.fail_pipeline_compile = fail;
    }

    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    /// Every submission so far, oldest first.
    #[inline]
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn pipeline(&self, pipeline: RawPipeline) -> Option<&PipelineRecord> {
        self.pipelines.get(&pipeline)
    }

    pub fn texture_pixels(&self, texture: RawTexture) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.pixels.as_slice())
    }

    /// Number of full-content writes into `texture`, creation included.
    pub fn texture_uploads(&self, texture: RawTexture) -> u32 {
        self.textures.get(&texture).map_or(0, |t| t.uploads)
    }

    /// Objects created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.pipelines.len()
            + self.textures.len()
            + self.descriptors.len()
            + self.buffers.len()
            + self.swapchains.len()
            + self.frames.len()
    }

    fn validate_pipeline(desc: &PipelineDesc<'_>) -> std::result::Result<(), String> {
        if desc.width == 0 || desc.height == 0 {
            return Err(format!("zero-sized target {}x{}", desc.width, desc.height));
        }
        for stage in [&desc.vertex, &desc.fragment] {
            if stage.source.trim().is_empty() {
                return Err(format!("{}: empty shader source", stage.label));
            }
            if !stage.source.contains(&format!("fn {}(", stage.entry_point)) {
                return Err(format!("{}: missing entry point `{}`", stage.label, stage.entry_point));
            }
        }
        let expected = match desc.kind {
            PaintKind::Solid => UniformLayout::Empty,
            PaintKind::Textured => UniformLayout::SingleTexture,
        };
        if desc.uniform_layout != expected {
            return Err(format!(
                "{:?} paint cannot use uniform layout {:?}",
                desc.kind, desc.uniform_layout
            ));
        }
        let used: u64 = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|a| a.components as u64 * 4)
            .sum();
        if used > desc.vertex_layout.stride {
            return Err("vertex attributes exceed stride".to_string());
        }
        Ok(())
    }

    fn record_draws(&self, desc: &SubmitDesc<'_>) -> Result<Vec<RecordedDraw>> {
        let mut draws = Vec::with_capacity(desc.draws.len());
        for draw in desc.draws {
            let record = self
                .pipelines
                .get(&draw.pipeline)
                .ok_or_else(|| Error::Backend(format!("unknown pipeline {:?}", draw.pipeline)))?;

            let texture = match (record.uniform_layout, draw.descriptors) {
                (UniformLayout::Empty, None) => None,
                (UniformLayout::SingleTexture, Some(d)) => Some(
                    self.descriptors
                        .get(&d)
                        .ok_or_else(|| Error::Backend(format!("unknown descriptor array {d:?}")))?
                        .texture,
                ),
                (layout, d) => {
                    return Err(Error::Backend(format!(
                        "descriptor {d:?} does not match uniform layout {layout:?}"
                    )));
                }
            };

            let vertices = match desc.vertex_buffer {
                Some(buffer) => {
                    let bytes = self
                        .buffers
                        .get(&buffer)
                        .ok_or_else(|| Error::Backend(format!("unknown vertex buffer {buffer:?}")))?;
                    let start = draw.first_vertex as usize * PaintVertex::SIZE;
                    let end = start + draw.vertex_count as usize * PaintVertex::SIZE;
                    if end > bytes.len() {
                        return Err(Error::Backend(format!(
                            "draw reads {end} bytes from a {}-byte vertex buffer",
                            bytes.len()
                        )));
                    }
                    bytes[start..end]
                        .chunks_exact(PaintVertex::SIZE)
                        .map(bytemuck::pod_read_unaligned::<PaintVertex>)
                        .collect()
                }
                None if draw.vertex_count == 0 => Vec::new(),
                None => return Err(Error::Backend("draw without a vertex buffer".to_string())),
            };

            draws.push(RecordedDraw {
                pipeline: draw.pipeline,
                kind: record.kind,
                texture,
                vertices,
            });
        }
        Ok(draws)
    }

    fn release_image(&mut self, frame: RawFrame) -> Option<FrameRecord> {
        let record = self.frames.remove(&frame)?;
        if let Some(chain) = self.swapchains.get_mut(&record.swapchain)
            && let Some(slot) = chain.in_flight.get_mut(record.index as usize)
        {
            *slot = false;
        }
        Some(record)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn label(&self) -> &'static str {
        "headless"
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<RawPipeline> {
        let reason = if self.init.fail_pipeline_compile {
            Err("compilation disabled by configuration".to_string())
        } else {
            Self::validate_pipeline(desc)
        };
        if let Err(reason) = reason {
            return Err(Error::PipelineCompileFailed { kind: desc.kind, reason });
        }

        let id = RawPipeline(self.ids.next());
        self.pipelines.insert(
            id,
            PipelineRecord {
                pass: desc.pass,
                kind: desc.kind,
                blend: desc.blend,
                uniform_layout: desc.uniform_layout,
                width: desc.width,
                height: desc.height,
            },
        );
        self.stats.pipelines_compiled += 1;
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<RawTexture> {
        if pixels.len() != desc.byte_len() {
            return Err(Error::PixelSizeMismatch {
                expected: desc.byte_len(),
                actual: pixels.len(),
            });
        }
        let id = RawTexture(self.ids.next());
        self.textures.insert(
            id,
            TextureRecord {
                desc: *desc,
                pixels: pixels.to_vec(),
                uploads: 1,
            },
        );
        self.stats.textures_created += 1;
        self.stats.texture_uploads += 1;
        Ok(id)
    }

    fn upload_texture(&mut self, texture: RawTexture, pixels: &[u8]) -> Result<()> {
        let record = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| Error::Backend(format!("unknown texture {texture:?}")))?;
        if pixels.len() != record.desc.byte_len() {
            return Err(Error::PixelSizeMismatch {
                expected: record.desc.byte_len(),
                actual: pixels.len(),
            });
        }
        record.pixels.clear();
        record.pixels.extend_from_slice(pixels);
        record.uploads += 1;
        self.stats.texture_uploads += 1;
        Ok(())
    }

    fn create_descriptor_array(
        &mut self,
        pipeline: RawPipeline,
        texture: RawTexture,
    ) -> Result<RawDescriptorArray> {
        let layout = self
            .pipelines
            .get(&pipeline)
            .map(|p| p.uniform_layout)
            .ok_or_else(|| Error::Backend(format!("unknown pipeline {pipeline:?}")))?;
        if layout != UniformLayout::SingleTexture {
            return Err(Error::Backend(format!(
                "pipeline {pipeline:?} has no texture binding"
            )));
        }
        if !self.textures.contains_key(&texture) {
            return Err(Error::Backend(format!("unknown texture {texture:?}")));
        }
        let id = RawDescriptorArray(self.ids.next());
        self.descriptors.insert(id, DescriptorRecord { texture });
        self.stats.descriptor_arrays_created += 1;
        Ok(id)
    }

    fn create_vertex_buffer(&mut self, capacity: u64) -> Result<RawBuffer> {
        let id = RawBuffer(self.ids.next());
        self.buffers.insert(id, Vec::with_capacity(capacity as usize));
        self.stats.vertex_buffers_created += 1;
        Ok(id)
    }

    fn upload_vertex_buffer(&mut self, buffer: RawBuffer, data: &[u8]) -> Result<()> {
        let bytes = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::Backend(format!("unknown vertex buffer {buffer:?}")))?;
        bytes.clear();
        bytes.extend_from_slice(data);
        Ok(())
    }

    fn create_offscreen_swapchain(
        &mut self,
        desc: &TextureDesc,
        image_count: u32,
    ) -> Result<RawSwapchain> {
        let count = if image_count == 0 { self.init.image_count } else { image_count };
        let id = RawSwapchain(self.ids.next());
        self.swapchains.insert(
            id,
            SwapchainRecord {
                desc: *desc,
                in_flight: vec![false; count.max(1) as usize],
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
        let chain = self
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| Error::Backend(format!("unknown swapchain {swapchain:?}")))?;
        chain.desc.width = width;
        chain.desc.height = height;
        Ok(())
    }

    fn acquire_frame(
        &mut self,
        swapchain: RawSwapchain,
        timeout: Duration,
    ) -> Result<AcquiredImage> {
        let chain = self
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| Error::Backend(format!("unknown swapchain {swapchain:?}")))?;

        let len = chain.in_flight.len();
        let free = (0..len)
            .map(|i| (chain.next + i) % len)
            .find(|&i| !chain.in_flight[i]);

        let index = match free {
            Some(index) if self.init.responsive => index,
            // Nothing on this thread can retire an image while we wait.
            _ => {
                std::thread::sleep(timeout);
                return Err(Error::FrameAcquireTimeout(timeout));
            }
        };

        chain.in_flight[index] = true;
        chain.next = (index + 1) % len;

        let frame = RawFrame(self.ids.next());
        self.frames.insert(
            frame,
            FrameRecord {
                swapchain,
                index: index as u32,
            },
        );
        self.stats.frames_acquired += 1;
        Ok(AcquiredImage {
            frame,
            index: index as u32,
        })
    }

    fn submit(&mut self, frame: RawFrame, desc: &SubmitDesc<'_>) -> Result<()> {
        let image_index = self
            .frames
            .get(&frame)
            .map(|f| f.index)
            .ok_or_else(|| Error::Backend(format!("unknown frame {frame:?}")))?;
        let draws = self.record_draws(desc)?;
        self.submissions.push(Submission {
            image_index,
            clear: desc.clear,
            draws,
        });
        Ok(())
    }

    fn present(&mut self, frame: RawFrame) -> Result<()> {
        self.release_image(frame)
            .ok_or_else(|| Error::Backend(format!("unknown frame {frame:?}")))?;
        self.stats.frames_presented += 1;
        Ok(())
    }

    fn destroy(&mut self, resource: RawResource) {
        let removed = match resource {
            RawResource::Pipeline(id) => self.pipelines.remove(&id).is_some(),
            RawResource::Texture(id) => self.textures.remove(&id).is_some(),
            RawResource::DescriptorArray(id) => self.descriptors.remove(&id).is_some(),
            RawResource::VertexBuffer(id) => self.buffers.remove(&id).is_some(),
            RawResource::Swapchain(id) => {
                self.frames.retain(|_, f| f.swapchain != id);
                self.swapchains.remove(&id).is_some()
            }
            RawResource::Frame(id) => self.release_image(id).is_some(),
        };
        if removed {
            self.stats.destroyed += 1;
        }
    }
}

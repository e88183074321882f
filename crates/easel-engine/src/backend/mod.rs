//! Abstract graphics backend.
//!
//! The engine talks to the GPU only through [`GraphicsBackend`], a small
//! capability set: create/destroy pipelines, textures, descriptor arrays and
//! vertex buffers, acquire/submit/present frames. Handles crossing this seam
//! are plain ids; ownership lives in the RAII wrappers of [`crate::device`].
//!
//! The set of backends is closed ([`Backend`]) and chosen by configuration
//! when the device is built.

mod gpu;
mod headless;

use std::time::Duration;

use crate::Result;
use crate::paint::{BlendMode, Color, PaintKind};

pub use gpu::{WgpuBackend, WgpuInit};
pub use headless::{
    HeadlessBackend, HeadlessInit, HeadlessStats, PipelineRecord, RecordedDraw, Submission,
};

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {$(
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            #[inline]
            pub fn id(self) -> u64 {
                self.0
            }
        }
    )*};
}

raw_handle! {
    /// Backend id of a compiled render pipeline.
    RawPipeline;
    /// Backend id of a sampled texture.
    RawTexture;
    /// Backend id of a descriptor array (texture + sampler binding).
    RawDescriptorArray;
    /// Backend id of a vertex buffer.
    RawBuffer;
    /// Backend id of a swapchain.
    RawSwapchain;
    /// Backend id of one acquired swapchain image.
    RawFrame;
}

/// Any backend object, as handed to [`GraphicsBackend::destroy`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RawResource {
    Pipeline(RawPipeline),
    Texture(RawTexture),
    DescriptorArray(RawDescriptorArray),
    VertexBuffer(RawBuffer),
    Swapchain(RawSwapchain),
    Frame(RawFrame),
}

/// Monotonic id source shared by every handle kind of one backend.
#[derive(Debug)]
pub(crate) struct IdSource(u64);

impl Default for IdSource {
    fn default() -> Self {
        Self(1)
    }
}

impl IdSource {
    #[inline]
    pub(crate) fn next(&mut self) -> u64 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// Texel formats understood by every backend. All are 4 bytes per texel.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
}

impl TextureFormat {
    #[inline]
    pub const fn bytes_per_texel(self) -> usize {
        4
    }
}

/// Shape of the attachment a pipeline renders into.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPass {
    pub format: TextureFormat,
}

impl RenderPass {
    #[inline]
    pub const fn new(format: TextureFormat) -> Self {
        Self { format }
    }
}

/// One `float32` vector attribute of a vertex.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub offset: u64,
    pub components: u32,
}

/// Interleaved vertex layout: one buffer, one stride.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: &'static [VertexAttribute],
}

/// Resource bindings a pipeline expects in group 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UniformLayout {
    /// Nothing bound.
    Empty,
    /// Binding 0: 2D float texture, binding 1: filtering sampler.
    SingleTexture,
}

/// A WGSL shader stage.
#[derive(Debug, Copy, Clone)]
pub struct ShaderStage<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub entry_point: &'a str,
}

/// Everything needed to compile a paint pipeline for one target shape.
#[derive(Debug, Copy, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub pass: RenderPass,
    pub kind: PaintKind,
    pub blend: BlendMode,
    pub vertex_layout: &'a VertexLayout,
    pub uniform_layout: UniformLayout,
    pub vertex: ShaderStage<'a>,
    pub fragment: ShaderStage<'a>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }
}

/// Result of a successful acquire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcquiredImage {
    pub frame: RawFrame,
    pub index: u32,
}

/// One draw call: a contiguous vertex range under one pipeline/binding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DrawDesc {
    pub pipeline: RawPipeline,
    pub descriptors: Option<RawDescriptorArray>,
    pub first_vertex: u32,
    pub vertex_count: u32,
}

/// A command submission against one acquired frame.
#[derive(Debug, Copy, Clone)]
pub struct SubmitDesc<'a> {
    pub clear: Option<Color>,
    pub vertex_buffer: Option<RawBuffer>,
    pub draws: &'a [DrawDesc],
}

/// Capability set every backend provides.
///
/// Implementations never own lifetime policy: ids are destroyed exactly when
/// [`GraphicsBackend::destroy`] is called for them.
pub trait GraphicsBackend {
    fn label(&self) -> &'static str;

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<RawPipeline>;

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<RawTexture>;

    /// Replaces the whole content of `texture`.
    fn upload_texture(&mut self, texture: RawTexture, pixels: &[u8]) -> Result<()>;

    /// Binds `texture` against the uniform layout of `pipeline`.
    fn create_descriptor_array(
        &mut self,
        pipeline: RawPipeline,
        texture: RawTexture,
    ) -> Result<RawDescriptorArray>;

    fn create_vertex_buffer(&mut self, capacity: u64) -> Result<RawBuffer>;

    fn upload_vertex_buffer(&mut self, buffer: RawBuffer, data: &[u8]) -> Result<()>;

    fn create_offscreen_swapchain(
        &mut self,
        desc: &TextureDesc,
        image_count: u32,
    ) -> Result<RawSwapchain>;

    fn resize_swapchain(&mut self, swapchain: RawSwapchain, width: u32, height: u32)
        -> Result<()>;

    /// Waits at most `timeout` for a presentable image.
    fn acquire_frame(&mut self, swapchain: RawSwapchain, timeout: Duration)
        -> Result<AcquiredImage>;

    fn submit(&mut self, frame: RawFrame, desc: &SubmitDesc<'_>) -> Result<()>;

    /// Presents and retires `frame`.
    fn present(&mut self, frame: RawFrame) -> Result<()>;

    /// Releases any backend object. Unknown ids are ignored.
    fn destroy(&mut self, resource: RawResource);
}

/// The closed set of backends a [`crate::device::Device`] can run on.
pub enum Backend {
    Wgpu(WgpuBackend),
    Headless(HeadlessBackend),
}

macro_rules! dispatch {
    ($self:ident, $b:ident => $body:expr) => {
        match $self {
            Backend::Wgpu($b) => $body,
            Backend::Headless($b) => $body,
        }
    };
}

impl GraphicsBackend for Backend {
    fn label(&self) -> &'static str {
        dispatch!(self, b => b.label())
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<RawPipeline> {
        dispatch!(self, b => b.create_pipeline(desc))
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<RawTexture> {
        dispatch!(self, b => b.create_texture(desc, pixels))
    }

    fn upload_texture(&mut self, texture: RawTexture, pixels: &[u8]) -> Result<()> {
        dispatch!(self, b => b.upload_texture(texture, pixels))
    }

    fn create_descriptor_array(
        &mut self,
        pipeline: RawPipeline,
        texture: RawTexture,
    ) -> Result<RawDescriptorArray> {
        dispatch!(self, b => b.create_descriptor_array(pipeline, texture))
    }

    fn create_vertex_buffer(&mut self, capacity: u64) -> Result<RawBuffer> {
        dispatch!(self, b => b.create_vertex_buffer(capacity))
    }

    fn upload_vertex_buffer(&mut self, buffer: RawBuffer, data: &[u8]) -> Result<()> {
        dispatch!(self, b => b.upload_vertex_buffer(buffer, data))
    }

    fn create_offscreen_swapchain(
        &mut self,
        desc: &TextureDesc,
        image_count: u32,
    ) -> Result<RawSwapchain> {
        dispatch!(self, b => b.create_offscreen_swapchain(desc, image_count))
    }

    fn resize_swapchain(
        &mut self,
        swapchain: RawSwapchain,
        width: u32,
        height: u32,
    ) -> Result<()> {
        dispatch!(self, b => b.resize_swapchain(swapchain, width, height))
    }

    fn acquire_frame(
        &mut self,
        swapchain: RawSwapchain,
        timeout: Duration,
    ) -> Result<AcquiredImage> {
        dispatch!(self, b => b.acquire_frame(swapchain, timeout))
    }

    fn submit(&mut self, frame: RawFrame, desc: &SubmitDesc<'_>) -> Result<()> {
        dispatch!(self, b => b.submit(frame, desc))
    }

    fn present(&mut self, frame: RawFrame) -> Result<()> {
        dispatch!(self, b => b.present(frame))
    }

    fn destroy(&mut self, resource: RawResource) {
        dispatch!(self, b => b.destroy(resource))
    }
}

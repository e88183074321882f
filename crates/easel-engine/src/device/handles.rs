//! Move-only owners of backend objects.
//!
//! Every wrapper holds exactly one raw id and releases it on drop. Wrappers
//! are not `Clone`; shared use goes through `Rc` so the id is released once,
//! when the last owner goes away.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::backend::{
    Backend, GraphicsBackend, PipelineDesc, RawBuffer, RawDescriptorArray, RawPipeline,
    RawResource, RawTexture, RenderPass, TextureDesc, TextureFormat,
};
use crate::paint::{BlendMode, PaintKind};
use crate::Result;

/// The backend plus the queue of releases that arrived while it was borrowed.
pub(crate) struct SharedBackend {
    backend: RefCell<Backend>,
    deferred: RefCell<Vec<RawResource>>,
}

impl SharedBackend {
    pub(crate) fn new(backend: Backend) -> Rc<Self> {
        Rc::new(Self {
            backend: RefCell::new(backend),
            deferred: RefCell::new(Vec::new()),
        })
    }

    /// Runs `f` against the backend after draining deferred releases.
    ///
    /// Not reentrant: `f` must not call back into this object.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Backend) -> R) -> R {
        let mut backend = self.backend.borrow_mut();
        let pending = std::mem::take(&mut *self.deferred.borrow_mut());
        for resource in pending {
            log::trace!("deferred release of {resource:?}");
            backend.destroy(resource);
        }
        f(&mut backend)
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, Backend> {
        self.backend.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, Backend> {
        self.backend.borrow_mut()
    }

    fn release(&self, resource: RawResource) {
        match self.backend.try_borrow_mut() {
            Ok(mut backend) => backend.destroy(resource),
            Err(_) => self.deferred.borrow_mut().push(resource),
        }
    }

    pub(crate) fn releaser(self: &Rc<Self>) -> Releaser {
        Releaser(Rc::downgrade(self))
    }

    pub(crate) fn create_pipeline(self: &Rc<Self>, desc: &PipelineDesc<'_>) -> Result<Pipeline> {
        let raw = self.with(|b| b.create_pipeline(desc))?;
        Ok(Pipeline {
            raw,
            kind: desc.kind,
            blend: desc.blend,
            pass: desc.pass,
            width: desc.width,
            height: desc.height,
            releaser: self.releaser(),
        })
    }

    pub(crate) fn create_texture(self: &Rc<Self>, desc: &TextureDesc, pixels: &[u8]) -> Result<Texture> {
        let raw = self.with(|b| b.create_texture(desc, pixels))?;
        Ok(Texture {
            raw,
            desc: *desc,
            releaser: self.releaser(),
        })
    }

    pub(crate) fn upload_texture(&self, texture: &Texture, pixels: &[u8]) -> Result<()> {
        self.with(|b| b.upload_texture(texture.raw, pixels))
    }

    pub(crate) fn create_descriptor_array(
        self: &Rc<Self>,
        pipeline: &Rc<Pipeline>,
        texture: &Rc<Texture>,
    ) -> Result<DescriptorArray> {
        let raw = self.with(|b| b.create_descriptor_array(pipeline.raw, texture.raw))?;
        Ok(DescriptorArray {
            raw,
            _pipeline: Rc::clone(pipeline),
            texture: Rc::clone(texture),
            releaser: self.releaser(),
        })
    }

    pub(crate) fn create_vertex_buffer(self: &Rc<Self>, capacity: u64) -> Result<VertexBuffer> {
        let raw = self.with(|b| b.create_vertex_buffer(capacity))?;
        Ok(VertexBuffer {
            raw,
            capacity,
            releaser: self.releaser(),
        })
    }
}

/// Weak back-reference used by wrappers to release their id.
///
/// Once the device is gone the backend already freed everything, so a late
/// release is a no-op.
#[derive(Clone)]
pub(crate) struct Releaser(Weak<SharedBackend>);

impl Releaser {
    pub(crate) fn release(&self, resource: RawResource) {
        if let Some(shared) = self.0.upgrade() {
            shared.release(resource);
        }
    }

    /// True when the handle was created by `shared`.
    fn is_from(&self, shared: &Rc<SharedBackend>) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(shared))
    }
}

/// A compiled paint pipeline for one target shape.
pub struct Pipeline {
    raw: RawPipeline,
    kind: PaintKind,
    blend: BlendMode,
    pass: RenderPass,
    width: u32,
    height: u32,
    releaser: Releaser,
}

impl Pipeline {
    #[inline]
    pub fn raw(&self) -> RawPipeline {
        self.raw
    }

    #[inline]
    pub fn kind(&self) -> PaintKind {
        self.kind
    }

    #[inline]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    #[inline]
    pub fn pass(&self) -> RenderPass {
        self.pass
    }

    /// Target shape this pipeline was compiled for.
    #[inline]
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        log::trace!("releasing pipeline {:?}", self.raw);
        self.releaser.release(RawResource::Pipeline(self.raw));
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("raw", &self.raw)
            .field("kind", &self.kind)
            .field("blend", &self.blend)
            .field("size", &(self.width, self.height))
            .finish()
    }
}

/// A sampled RGBA texture.
pub struct Texture {
    raw: RawTexture,
    desc: TextureDesc,
    releaser: Releaser,
}

impl Texture {
    #[inline]
    pub fn raw(&self) -> RawTexture {
        self.raw
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.releaser.release(RawResource::Texture(self.raw));
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("raw", &self.raw)
            .field("size", &(self.desc.width, self.desc.height))
            .finish()
    }
}

/// A texture bound against a pipeline's uniform layout.
///
/// Keeps both the pipeline and the texture alive while it exists.
pub struct DescriptorArray {
    raw: RawDescriptorArray,
    _pipeline: Rc<Pipeline>,
    texture: Rc<Texture>,
    releaser: Releaser,
}

impl DescriptorArray {
    #[inline]
    pub fn raw(&self) -> RawDescriptorArray {
        self.raw
    }

    #[inline]
    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }
}

impl Drop for DescriptorArray {
    fn drop(&mut self) {
        self.releaser.release(RawResource::DescriptorArray(self.raw));
    }
}

/// Growable GPU vertex storage.
pub struct VertexBuffer {
    raw: RawBuffer,
    capacity: u64,
    releaser: Releaser,
}

impl VertexBuffer {
    #[inline]
    pub fn raw(&self) -> RawBuffer {
        self.raw
    }

    /// Capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn is_from(&self, shared: &Rc<SharedBackend>) -> bool {
        self.releaser.is_from(shared)
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.releaser.release(RawResource::VertexBuffer(self.raw));
    }
}

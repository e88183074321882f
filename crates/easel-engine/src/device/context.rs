use std::cell::{Ref, RefMut};
use std::rc::Rc;

use crate::atlas::{Atlas, Sprite};
use crate::backend::{
    Backend, DrawDesc, GraphicsBackend, HeadlessBackend, RenderPass, SubmitDesc, TextureDesc,
    TextureFormat, WgpuBackend,
};
use crate::canvas::Canvas;
use crate::coords::PixelRect;
use crate::pipeline::{PipelineCache, PipelineKey};
use crate::{Error, Result};

use super::config::{BackendKind, DeviceConfig};
use super::frame::{Frame, Swapchain};
use super::handles::{DescriptorArray, Pipeline, SharedBackend, Texture, VertexBuffer};

/// Owns the backend and everything shared between canvases: the pipeline
/// cache, the sprite atlas and the 1×1 white texture.
///
/// A device is single-threaded (`!Send`). Every handle it creates releases
/// itself on drop; handles outliving the device release nothing.
pub struct Device {
    shared: Rc<SharedBackend>,
    config: DeviceConfig,
    pipelines: PipelineCache,
    atlas: Atlas,
    white: Rc<Texture>,
}

impl Device {
    /// Builds the backend selected by `config`.
    ///
    /// Fails with [`Error::NoDevice`] when the backend is unavailable; no
    /// later call looks for it again.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let backend = match &config.backend {
            BackendKind::Wgpu(init) => {
                Backend::Wgpu(pollster::block_on(WgpuBackend::new(init.clone()))?)
            }
            BackendKind::Headless(init) => Backend::Headless(HeadlessBackend::new(init.clone())),
        };
        let label = backend.label();
        let shared = SharedBackend::new(backend);

        let white_desc = TextureDesc {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
        };
        let white = Rc::new(shared.create_texture(&white_desc, &[255; 4])?);

        log::info!(
            "device ready: backend={label} atlas_page={} frame_timeout={:?}",
            config.atlas_page_size,
            config.frame_timeout
        );

        Ok(Self {
            shared,
            atlas: Atlas::new(config.atlas_page_size),
            config,
            pipelines: PipelineCache::new(),
            white,
        })
    }

    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn backend_label(&self) -> &'static str {
        self.shared.borrow().label()
    }

    #[inline]
    pub fn atlas(&self) -> &Atlas {
        &self.atlas
    }

    #[inline]
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// Texture painted by empty sprites.
    #[inline]
    pub fn white_texture(&self) -> &Rc<Texture> {
        &self.white
    }

    /// The in-memory backend, when the device runs on it.
    pub fn headless(&self) -> Option<Ref<'_, HeadlessBackend>> {
        Ref::filter_map(self.shared.borrow(), |b| match b {
            Backend::Headless(h) => Some(h),
            Backend::Wgpu(_) => None,
        })
        .ok()
    }

    pub fn headless_mut(&mut self) -> Option<RefMut<'_, HeadlessBackend>> {
        RefMut::filter_map(self.shared.borrow_mut(), |b| match b {
            Backend::Headless(h) => Some(h),
            Backend::Wgpu(_) => None,
        })
        .ok()
    }

    /// Creates a standalone RGBA8 texture (straight alpha).
    pub fn create_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Rc<Texture>> {
        let desc = TextureDesc {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
        };
        Ok(Rc::new(self.shared.create_texture(&desc, pixels)?))
    }

    // ---- atlas ----

    /// Packs an RGBA8 image into the atlas.
    pub fn allocate_sprite(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Sprite> {
        self.atlas.allocate(pixels, width, height)
    }

    pub fn release_sprite(&mut self, sprite: Sprite) -> Result<()> {
        self.atlas.release(sprite)
    }

    /// Texture and texel rectangle a sprite samples from, uploading its page
    /// first when it changed. Empty sprites resolve to the white texture.
    pub fn resolve_sprite(&mut self, sprite: &Sprite) -> Result<(Rc<Texture>, PixelRect)> {
        match sprite.allocation() {
            Some(alloc) => self.atlas.resolve(&self.shared, alloc),
            None => Ok((Rc::clone(&self.white), PixelRect::new(0, 0, 1, 1))),
        }
    }

    // ---- pipelines ----

    /// Resolves the cached pipeline for `key` on a `width×height` target.
    ///
    /// May compile, and may replace the slot's previous pipeline. Callers
    /// resolve again whenever state or shape may have changed.
    pub fn pipeline_for(
        &mut self,
        pass: RenderPass,
        key: PipelineKey,
        width: u32,
        height: u32,
    ) -> Result<Rc<Pipeline>> {
        self.pipelines.pipeline_for(&self.shared, pass, key, width, height)
    }

    pub(crate) fn create_descriptor_array(
        &mut self,
        pipeline: &Rc<Pipeline>,
        texture: &Rc<Texture>,
    ) -> Result<DescriptorArray> {
        self.shared.create_descriptor_array(pipeline, texture)
    }

    pub(crate) fn create_vertex_buffer(&mut self, capacity: u64) -> Result<VertexBuffer> {
        self.shared.create_vertex_buffer(capacity)
    }

    /// True when `buffer` lives in this device's backend.
    pub(crate) fn owns_vertex_buffer(&self, buffer: &VertexBuffer) -> bool {
        buffer.is_from(&self.shared)
    }

    pub(crate) fn upload_vertex_buffer(&mut self, buffer: &VertexBuffer, data: &[u8]) -> Result<()> {
        self.shared.with(|b| b.upload_vertex_buffer(buffer.raw(), data))
    }

    // ---- swapchains & frames ----

    /// An offscreen ring of `width×height` images. `image_count == 0` picks
    /// the backend's default.
    pub fn create_offscreen_swapchain(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        image_count: u32,
    ) -> Result<Swapchain> {
        let desc = TextureDesc { width, height, format };
        let raw = self
            .shared
            .with(|b| b.create_offscreen_swapchain(&desc, image_count))?;
        Ok(Swapchain::new(raw, format, width, height, self.shared.releaser()))
    }

    /// A swapchain presenting to a window. Only the wgpu backend has surfaces.
    pub fn create_surface_swapchain(
        &mut self,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Swapchain> {
        let (raw, format) = self.shared.with(|b| match b {
            Backend::Wgpu(gpu) => gpu.create_surface_swapchain(target, width, height),
            Backend::Headless(_) => Err(Error::Unsupported("headless backend has no surfaces")),
        })?;
        Ok(Swapchain::new(raw, format, width, height, self.shared.releaser()))
    }

    /// Resizes the swapchain's images. Frames acquired before become stale.
    pub fn resize_swapchain(&mut self, swapchain: &mut Swapchain, width: u32, height: u32) -> Result<()> {
        self.shared
            .with(|b| b.resize_swapchain(swapchain.raw(), width, height))?;
        swapchain.resized(width, height);
        log::debug!("swapchain {:?} resized to {width}x{height}", swapchain.raw());
        Ok(())
    }

    /// Acquires the next image, waiting at most the configured frame timeout.
    ///
    /// The new frame supersedes every earlier frame of this swapchain.
    pub fn acquire_frame(&mut self, swapchain: &Swapchain) -> Result<Frame> {
        let timeout = self.config.frame_timeout;
        match self.shared.with(|b| b.acquire_frame(swapchain.raw(), timeout)) {
            Ok(image) => {
                log::trace!("acquired image {} of {:?}", image.index, swapchain.raw());
                Ok(swapchain.next_frame(image.frame, image.index, self.shared.releaser()))
            }
            Err(err) => {
                if err.is_transient() {
                    log::debug!("frame acquire on {:?}: {err}", swapchain.raw());
                }
                Err(err)
            }
        }
    }

    /// Submits a finished canvas against `frame`.
    ///
    /// Dirty atlas pages are uploaded first, so every draw reads current
    /// page content. A frame accepts exactly one submission.
    pub fn submit(&mut self, frame: &mut Frame, canvas: &Canvas) -> Result<()> {
        frame.check_submit()?;
        if !canvas.is_ready() {
            return Err(Error::PaintNotFinished);
        }
        if canvas.render_pass() != frame.render_pass() {
            return Err(Error::Backend(format!(
                "canvas pass {:?} does not match frame pass {:?}",
                canvas.render_pass(),
                frame.render_pass()
            )));
        }
        if canvas.target_size() != frame.size() {
            return Err(Error::TargetSizeMismatch {
                canvas: canvas.target_size(),
                frame: frame.size(),
            });
        }

        self.atlas.flush(&self.shared)?;

        let draws: Vec<DrawDesc> = canvas.draw_calls().iter().map(|d| d.desc()).collect();
        let desc = SubmitDesc {
            clear: canvas.clear_color(),
            vertex_buffer: canvas.vertex_buffer().map(VertexBuffer::raw),
            draws: &draws,
        };
        self.shared.with(|b| b.submit(frame.raw(), &desc))?;
        frame.mark_submitted();
        log::trace!("submitted {} draws to frame {:?}", draws.len(), frame.raw());
        Ok(())
    }

    /// Presents a submitted frame. The frame is consumed either way.
    pub fn present(&mut self, mut frame: Frame) -> Result<()> {
        frame.check_present()?;
        self.shared.with(|b| b.present(frame.raw()))?;
        frame.mark_presented();
        Ok(())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.backend_label())
            .field("atlas", &self.atlas)
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::backend::HeadlessInit;
    use crate::coords::Rect;
    use crate::paint::{BlendMode, Brush, Color, PaintKind};

    fn device() -> Device {
        Device::new(DeviceConfig::headless().with_frame_timeout(Duration::from_millis(20))).unwrap()
    }

    fn offscreen(device: &mut Device) -> Swapchain {
        device
            .create_offscreen_swapchain(32, 32, TextureFormat::Rgba8Unorm, 0)
            .unwrap()
    }

    fn painted(device: &mut Device, pass: RenderPass) -> Canvas {
        let mut canvas = Canvas::new(pass);
        let mut p = canvas.begin_paint(device, true, 32, 32);
        p.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0)).unwrap();
        p.end_paint().unwrap();
        canvas
    }

    #[test]
    fn frame_accepts_exactly_one_submission() {
        let mut device = device();
        let chain = offscreen(&mut device);
        let canvas = painted(&mut device, chain.render_pass());

        let mut frame = device.acquire_frame(&chain).unwrap();
        device.submit(&mut frame, &canvas).unwrap();
        assert_eq!(device.submit(&mut frame, &canvas), Err(Error::StaleFrame));
        device.present(frame).unwrap();
    }

    #[test]
    fn newer_acquire_makes_older_frame_stale() {
        let mut device = device();
        let chain = offscreen(&mut device);
        let canvas = painted(&mut device, chain.render_pass());

        let mut old = device.acquire_frame(&chain).unwrap();
        let mut new = device.acquire_frame(&chain).unwrap();
        assert!(old.is_stale());
        assert_ne!(old.index(), new.index());
        assert_eq!(device.submit(&mut old, &canvas), Err(Error::StaleFrame));

        device.submit(&mut new, &canvas).unwrap();
        device.present(new).unwrap();
        drop(old);

        // Both images are free again.
        assert!(device.acquire_frame(&chain).is_ok());
    }

    #[test]
    fn present_requires_a_submission() {
        let mut device = device();
        let chain = offscreen(&mut device);
        let frame = device.acquire_frame(&chain).unwrap();
        assert_eq!(device.present(frame), Err(Error::FrameNotSubmitted));

        // The discarded frame returned its image.
        let headless = device.headless().unwrap();
        assert_eq!(headless.stats().frames_presented, 0);
        drop(headless);
        assert!(device.acquire_frame(&chain).is_ok());
    }

    #[test]
    fn resize_invalidates_acquired_frames() {
        let mut device = device();
        let mut chain = offscreen(&mut device);
        let canvas = painted(&mut device, chain.render_pass());

        let mut frame = device.acquire_frame(&chain).unwrap();
        device.resize_swapchain(&mut chain, 64, 48).unwrap();
        assert_eq!(chain.size(), (64, 48));
        assert_eq!(device.submit(&mut frame, &canvas), Err(Error::StaleFrame));

        let next = device.acquire_frame(&chain).unwrap();
        assert_eq!(next.size(), (64, 48));
    }

    #[test]
    fn canvas_painted_before_resize_is_rejected() {
        let mut device = device();
        let mut chain = offscreen(&mut device);
        let stale = painted(&mut device, chain.render_pass());

        device.resize_swapchain(&mut chain, 64, 48).unwrap();
        let mut frame = device.acquire_frame(&chain).unwrap();
        assert_eq!(
            device.submit(&mut frame, &stale),
            Err(Error::TargetSizeMismatch {
                canvas: (32, 32),
                frame: (64, 48),
            })
        );
        assert!(!frame.is_submitted());

        let mut canvas = Canvas::new(chain.render_pass());
        let mut p = canvas.begin_paint(&mut device, true, 64, 48);
        p.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0)).unwrap();
        p.end_paint().unwrap();
        device.submit(&mut frame, &canvas).unwrap();
        device.present(frame).unwrap();

        let headless = device.headless().unwrap();
        let draw = &headless.submissions()[0].draws[0];
        let pipeline = headless.pipeline(draw.pipeline).unwrap();
        assert_eq!((pipeline.width, pipeline.height), (64, 48));
    }

    #[test]
    fn acquire_times_out_on_unresponsive_backend() {
        let mut device = device();
        let chain = offscreen(&mut device);
        device.headless_mut().unwrap().set_responsive(false);

        let start = Instant::now();
        let err = device.acquire_frame(&chain).unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err, Error::FrameAcquireTimeout(Duration::from_millis(20)));
        assert!(err.is_transient());
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");

        device.headless_mut().unwrap().set_responsive(true);
        let start = Instant::now();
        device.acquire_frame(&chain).unwrap();
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn all_images_in_flight_times_out() {
        let mut device = Device::new(
            DeviceConfig::headless()
                .with_backend(BackendKind::Headless(HeadlessInit {
                    image_count: 1,
                    ..Default::default()
                }))
                .with_frame_timeout(Duration::from_millis(5)),
        )
        .unwrap();
        let chain = offscreen(&mut device);
        let _held = device.acquire_frame(&chain).unwrap();
        assert!(matches!(
            device.acquire_frame(&chain),
            Err(Error::FrameAcquireTimeout(_))
        ));
    }

    #[test]
    fn full_cycle_leaks_nothing() {
        let mut device = device();
        let baseline = device.headless().unwrap().live_objects();

        {
            let chain = offscreen(&mut device);
            let sprite = device.allocate_sprite(&[255u8; 4 * 4 * 4], 4, 4).unwrap();
            let mut canvas = Canvas::new(chain.render_pass());

            let mut p = canvas.begin_paint(&mut device, true, 32, 32);
            p.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0)).unwrap();
            p.draw_sprite(&sprite, Rect::new(4.0, 4.0, 4.0, 4.0), Color::WHITE)
                .unwrap();
            p.end_paint().unwrap();

            let mut frame = device.acquire_frame(&chain).unwrap();
            device.submit(&mut frame, &canvas).unwrap();
            device.present(frame).unwrap();

            // Abandoned frame on the same chain.
            let _unused = device.acquire_frame(&chain).unwrap();
        }

        // What stays: two cached pipelines and the atlas page texture.
        let headless = device.headless().unwrap();
        assert_eq!(headless.live_objects(), baseline + 3);
        assert_eq!(device.pipeline_cache().len(), 2);
    }

    #[test]
    fn release_while_backend_is_borrowed_is_deferred() {
        let mut device = device();
        let texture = device.create_texture(&[1u8; 4 * 2 * 2], 2, 2).unwrap();
        let raw = texture.raw();

        {
            let guard = device.headless().unwrap();
            drop(texture);
            assert!(guard.texture_pixels(raw).is_some());
        }

        // Next device operation drains the queue.
        device
            .pipeline_for(
                RenderPass::default(),
                PipelineKey::new(PaintKind::Solid, BlendMode::SourceOver),
                8,
                8,
            )
            .unwrap();
        assert!(device.headless().unwrap().texture_pixels(raw).is_none());
    }

    #[test]
    fn handles_outliving_device_release_nothing() {
        let mut device = device();
        let texture = device.create_texture(&[0u8; 4], 1, 1).unwrap();
        let chain = offscreen(&mut device);
        drop(device);
        drop(chain);
        drop(texture);
    }

    #[test]
    fn submit_uploads_dirty_atlas_pages_first() {
        let mut device = device();
        let chain = offscreen(&mut device);
        let sprite = device.allocate_sprite(&[10u8; 2 * 2 * 4], 2, 2).unwrap();

        let mut canvas = Canvas::new(chain.render_pass());
        let mut p = canvas.begin_paint(&mut device, false, 32, 32);
        p.set_brush(Brush::sprite(sprite, Color::WHITE)).unwrap();
        p.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0)).unwrap();
        // Mutates the page after it was resolved for this draw.
        let late = p.device().allocate_sprite(&[77u8; 2 * 2 * 4], 2, 2).unwrap();
        p.end_paint().unwrap();

        let page = sprite.allocation().unwrap().page();
        assert!(device.atlas().is_dirty(page));

        let mut frame = device.acquire_frame(&chain).unwrap();
        device.submit(&mut frame, &canvas).unwrap();
        assert!(!device.atlas().is_dirty(page));

        let texture = device.atlas().page_texture(page).unwrap().raw();
        let stride = device.atlas().page_size() as usize;
        let headless = device.headless().unwrap();
        let pixels = headless.texture_pixels(texture).unwrap();
        let region = |rect: PixelRect| -> Vec<u8> {
            (rect.y..rect.bottom())
                .flat_map(|y| {
                    let start = (y as usize * stride + rect.x as usize) * 4;
                    pixels[start..start + rect.w as usize * 4].iter().copied()
                })
                .collect()
        };

        // The first sprite survives the re-upload caused by the second.
        assert_eq!(region(sprite.allocation().unwrap().rect()), vec![10u8; 2 * 2 * 4]);
        assert_eq!(region(late.allocation().unwrap().rect()), vec![77u8; 2 * 2 * 4]);
        assert_eq!(headless.texture_uploads(texture), 2);
    }

    #[test]
    fn mismatched_pass_is_rejected() {
        let mut device = device();
        let chain = offscreen(&mut device);
        let canvas = painted(&mut device, RenderPass::new(TextureFormat::Bgra8Unorm));
        let mut frame = device.acquire_frame(&chain).unwrap();
        assert!(matches!(device.submit(&mut frame, &canvas), Err(Error::Backend(_))));
        assert!(!frame.is_submitted());
    }

    #[test]
    fn headless_device_reports_its_backend() {
        let device = device();
        assert_eq!(device.backend_label(), "headless");
        assert!(device.config().atlas_page_size > 0);
    }
}

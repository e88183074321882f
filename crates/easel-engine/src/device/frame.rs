use std::cell::Cell;
use std::rc::Rc;

use crate::backend::{RawFrame, RawResource, RawSwapchain, RenderPass, TextureFormat};
use crate::{Error, Result};

use super::handles::Releaser;

/// A chain of presentable images: a window surface or an offscreen ring.
///
/// Every acquire and every resize advances the swapchain's serial. A
/// [`Frame`] is only usable while its serial is the current one.
pub struct Swapchain {
    raw: RawSwapchain,
    format: TextureFormat,
    width: u32,
    height: u32,
    serial: Rc<Cell<u64>>,
    releaser: Releaser,
}

impl Swapchain {
    pub(crate) fn new(
        raw: RawSwapchain,
        format: TextureFormat,
        width: u32,
        height: u32,
        releaser: Releaser,
    ) -> Self {
        Self {
            raw,
            format,
            width,
            height,
            serial: Rc::new(Cell::new(0)),
            releaser,
        }
    }

    #[inline]
    pub fn raw(&self) -> RawSwapchain {
        self.raw
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Render pass shape pipelines drawing into this swapchain must match.
    #[inline]
    pub fn render_pass(&self) -> RenderPass {
        RenderPass::new(self.format)
    }

    pub(crate) fn resized(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.serial.set(self.serial.get() + 1);
    }

    /// Starts a new cycle; frames from earlier cycles become stale.
    pub(crate) fn next_frame(&self, raw: RawFrame, index: u32, releaser: Releaser) -> Frame {
        let serial = self.serial.get() + 1;
        self.serial.set(serial);
        Frame {
            raw,
            swapchain: self.raw,
            serial,
            current: Rc::clone(&self.serial),
            index,
            width: self.width,
            height: self.height,
            format: self.format,
            submitted: false,
            live: true,
            releaser,
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Invalidate frames that outlive their chain.
        self.serial.set(self.serial.get() + 1);
        self.releaser.release(RawResource::Swapchain(self.raw));
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("raw", &self.raw)
            .field("format", &self.format)
            .field("size", &(self.width, self.height))
            .finish()
    }
}

/// One acquired presentable image for one render cycle.
///
/// Lifecycle: acquire, exactly one submission, present. Dropping a frame
/// without presenting discards the image.
pub struct Frame {
    raw: RawFrame,
    swapchain: RawSwapchain,
    serial: u64,
    current: Rc<Cell<u64>>,
    index: u32,
    width: u32,
    height: u32,
    format: TextureFormat,
    submitted: bool,
    live: bool,
    releaser: Releaser,
}

impl Frame {
    #[inline]
    pub fn raw(&self) -> RawFrame {
        self.raw
    }

    #[inline]
    pub fn swapchain(&self) -> RawSwapchain {
        self.swapchain
    }

    /// Which swapchain image this frame represents.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn render_pass(&self) -> RenderPass {
        RenderPass::new(self.format)
    }

    /// True once a later acquire or a resize superseded this frame.
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.serial != self.current.get()
    }

    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub(crate) fn check_submit(&self) -> Result<()> {
        if self.submitted || self.is_stale() {
            return Err(Error::StaleFrame);
        }
        Ok(())
    }

    pub(crate) fn check_present(&self) -> Result<()> {
        if self.is_stale() {
            return Err(Error::StaleFrame);
        }
        if !self.submitted {
            return Err(Error::FrameNotSubmitted);
        }
        Ok(())
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.submitted = true;
    }

    /// The backend consumed the image; nothing left to release.
    pub(crate) fn mark_presented(&mut self) {
        self.live = false;
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if self.live {
            log::trace!("discarding unpresented frame {:?}", self.raw);
            self.releaser.release(RawResource::Frame(self.raw));
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("raw", &self.raw)
            .field("index", &self.index)
            .field("serial", &self.serial)
            .field("submitted", &self.submitted)
            .finish()
    }
}

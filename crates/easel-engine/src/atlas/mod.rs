//! Sprite atlas.
//!
//! Packs small RGBA8 images (straight alpha) into square pages. Pages are
//! created on demand and scanned in creation order, so allocation is
//! deterministic. Uploads are page-granular: any mutation marks the whole
//! page dirty and the next resolve re-uploads it.

mod page;
mod sprite;

use std::rc::Rc;

use crate::coords::PixelRect;
use crate::device::Texture;
use crate::device::handles::SharedBackend;
use crate::{Error, Result};

use page::AtlasPage;

pub use sprite::{AllocId, Allocation, PageId, Sprite};

/// Atlas bookkeeping counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AtlasStats {
    pub pages: usize,
    pub live_allocations: usize,
    /// Page texture creations plus re-uploads.
    pub uploads: u64,
}

/// Page allocator. Owns every page; sprites only refer to them.
pub struct Atlas {
    page_size: u32,
    pages: Vec<AtlasPage>,
    next_alloc: u64,
    uploads: u64,
}

impl Atlas {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            pages: Vec::new(),
            next_alloc: 1,
            uploads: 0,
        }
    }

    #[inline]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Copies a `w×h` RGBA8 image into the first page with room, creating a
    /// page when none has.
    ///
    /// A zero-sized image yields the empty sprite without touching any page.
    pub fn allocate(&mut self, pixels: &[u8], w: u32, h: u32) -> Result<Sprite> {
        if w > self.page_size || h > self.page_size {
            return Err(Error::OutOfAtlasSpace {
                width: w,
                height: h,
                max: self.page_size,
            });
        }
        let expected = w as usize * h as usize * 4;
        if pixels.len() != expected {
            return Err(Error::PixelSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        if w == 0 || h == 0 {
            return Ok(Sprite::default());
        }

        let id = AllocId(self.next_alloc);
        self.next_alloc += 1;

        let placed = self
            .pages
            .iter_mut()
            .find_map(|page| page.insert(id, pixels, w, h).map(|rect| (page.id(), rect)));
        if let Some((page_id, rect)) = placed {
            return Ok(self.sprite(page_id, id, rect));
        }

        let page_id = PageId(self.pages.len() as u32);
        let mut page = AtlasPage::new(page_id, self.page_size);
        log::debug!("atlas: page {page_id:?} created for a {w}x{h} image");
        // A fresh page fits anything up to the page size.
        let rect = page
            .insert(id, pixels, w, h)
            .ok_or(Error::OutOfAtlasSpace { width: w, height: h, max: self.page_size })?;
        self.pages.push(page);
        Ok(self.sprite(page_id, id, rect))
    }

    fn sprite(&self, page: PageId, id: AllocId, rect: PixelRect) -> Sprite {
        Sprite::new(Allocation {
            page,
            id,
            rect,
            page_extent: (self.page_size, self.page_size),
        })
    }

    /// Returns a sprite's rectangle to its page for reuse.
    ///
    /// Neighbours are not moved. The page pixels are left as they are, so
    /// the page stays clean. Releasing the empty sprite is a no-op.
    pub fn release(&mut self, sprite: Sprite) -> Result<()> {
        let Some(alloc) = sprite.allocation() else {
            return Ok(());
        };
        let page = self
            .pages
            .get_mut(alloc.page.index())
            .ok_or(Error::UnknownAllocation)?;
        page.remove(alloc.id)
    }

    /// Makes the allocation's page current on the GPU and returns its texture
    /// and the image rectangle inside it.
    ///
    /// Resolving a clean page returns the same texture without uploading.
    pub(crate) fn resolve(
        &mut self,
        gpu: &Rc<SharedBackend>,
        alloc: &Allocation,
    ) -> Result<(Rc<Texture>, PixelRect)> {
        let page = self
            .pages
            .get_mut(alloc.page.index())
            .filter(|p| p.contains(alloc.id))
            .ok_or(Error::UnknownAllocation)?;
        if page.needs_upload() {
            self.uploads += 1;
        }
        let texture = page.resolve(gpu)?;
        Ok((texture, alloc.rect))
    }

    /// Re-uploads every dirty page that already has a texture.
    ///
    /// Pages never resolved stay CPU-only.
    pub(crate) fn flush(&mut self, gpu: &Rc<SharedBackend>) -> Result<()> {
        for page in &mut self.pages {
            if page.texture().is_some() && page.is_dirty() {
                page.resolve(gpu)?;
                self.uploads += 1;
            }
        }
        Ok(())
    }

    /// The texture of a page, if it was ever resolved.
    pub fn page_texture(&self, page: PageId) -> Option<&Rc<Texture>> {
        self.pages.get(page.index()).and_then(|p| p.texture())
    }

    pub fn is_dirty(&self, page: PageId) -> bool {
        self.pages.get(page.index()).is_some_and(|p| p.is_dirty())
    }

    /// CPU copy of a page.
    pub fn page_pixels(&self, page: PageId) -> Option<&[u8]> {
        self.pages.get(page.index()).map(|p| p.pixels())
    }

    /// Number of pages with nothing allocated.
    pub fn vacant_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_vacant()).count()
    }

    pub fn stats(&self) -> AtlasStats {
        AtlasStats {
            pages: self.pages.len(),
            live_allocations: self.pages.iter().map(|p| p.live_allocations()).sum(),
            uploads: self.uploads,
        }
    }
}

impl std::fmt::Debug for Atlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atlas")
            .field("page_size", &self.page_size)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, HeadlessBackend};

    fn image(w: u32, h: u32, seed: u8) -> Vec<u8> {
        (0..w * h * 4).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn headless() -> Rc<SharedBackend> {
        SharedBackend::new(Backend::Headless(HeadlessBackend::default()))
    }

    fn with_headless<R>(gpu: &Rc<SharedBackend>, f: impl FnOnce(&HeadlessBackend) -> R) -> R {
        match &*gpu.borrow() {
            Backend::Headless(h) => f(h),
            Backend::Wgpu(_) => unreachable!(),
        }
    }

    fn live_rects(sprites: &[Sprite]) -> Vec<(PageId, PixelRect)> {
        sprites
            .iter()
            .filter_map(|s| s.allocation().map(|a| (a.page(), a.rect())))
            .collect()
    }

    #[test]
    fn oversized_image_is_out_of_space() {
        let mut atlas = Atlas::new(32);
        assert_eq!(
            atlas.allocate(&image(33, 4, 0), 33, 4),
            Err(Error::OutOfAtlasSpace { width: 33, height: 4, max: 32 })
        );
        assert_eq!(atlas.stats().pages, 0);
    }

    #[test]
    fn wrong_pixel_length_is_rejected() {
        let mut atlas = Atlas::new(32);
        assert_eq!(
            atlas.allocate(&[0u8; 10], 2, 2),
            Err(Error::PixelSizeMismatch { expected: 16, actual: 10 })
        );
    }

    #[test]
    fn zero_sized_image_gives_empty_sprite() {
        let mut atlas = Atlas::new(32);
        let s = atlas.allocate(&[], 0, 5).unwrap();
        assert!(s.is_empty());
        assert!(s.allocation().is_none());
        atlas.release(s).unwrap();
    }

    #[test]
    fn live_allocations_never_overlap() {
        let mut atlas = Atlas::new(64);
        let mut live: Vec<Sprite> = Vec::new();

        // Deterministic pseudo-random allocate/release sequence.
        let mut state = 0x2545_f491u32;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        for step in 0..400 {
            let r = next();
            if r % 3 == 0 && !live.is_empty() {
                let victim = live.remove(r as usize % live.len());
                atlas.release(victim).unwrap();
            } else {
                let w = 1 + next() % 24;
                let h = 1 + next() % 24;
                live.push(atlas.allocate(&image(w, h, step as u8), w, h).unwrap());
            }

            let rects = live_rects(&live);
            for (i, (pa, a)) in rects.iter().enumerate() {
                assert!(a.right() <= 64 && a.bottom() <= 64);
                for (pb, b) in &rects[i + 1..] {
                    assert!(pa != pb || !a.overlaps(*b), "step {step}: {a:?} overlaps {b:?}");
                }
            }
        }
        assert_eq!(atlas.stats().live_allocations, live.len());
    }

    #[test]
    fn allocation_is_deterministic_and_first_fit_by_page() {
        let sizes = [(40, 40), (40, 40), (10, 10), (20, 50), (5, 5)];
        let run = || {
            let mut atlas = Atlas::new(64);
            sizes
                .iter()
                .map(|&(w, h)| {
                    let s = atlas.allocate(&image(w, h, 1), w, h).unwrap();
                    let a = *s.allocation().unwrap();
                    (a.page(), a.rect())
                })
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());

        // The second 40x40 cannot share page 0; the 10x10 still lands there.
        assert_eq!(first[0].0, PageId(0));
        assert_eq!(first[1].0, PageId(1));
        assert_eq!(first[2].0, PageId(0));
    }

    #[test]
    fn released_space_is_reused() {
        let mut atlas = Atlas::new(16);
        let a = atlas.allocate(&image(16, 16, 0), 16, 16).unwrap();
        let rect = a.allocation().unwrap().rect();
        atlas.release(a).unwrap();
        assert_eq!(atlas.vacant_pages(), 1);

        let b = atlas.allocate(&image(16, 16, 9), 16, 16).unwrap();
        assert_eq!(b.allocation().unwrap().rect(), rect);
        assert_eq!(atlas.stats().pages, 1);
    }

    #[test]
    fn double_release_is_unknown() {
        let mut atlas = Atlas::new(16);
        let s = atlas.allocate(&image(2, 2, 0), 2, 2).unwrap();
        atlas.release(s).unwrap();
        assert_eq!(atlas.release(s), Err(Error::UnknownAllocation));
    }

    #[test]
    fn clean_page_resolves_to_same_texture_without_upload() {
        let gpu = headless();
        let mut atlas = Atlas::new(32);
        let s = atlas.allocate(&image(4, 4, 3), 4, 4).unwrap();
        let alloc = *s.allocation().unwrap();

        let (t1, _) = atlas.resolve(&gpu, &alloc).unwrap();
        let (t2, _) = atlas.resolve(&gpu, &alloc).unwrap();
        assert!(Rc::ptr_eq(&t1, &t2));
        assert_eq!(with_headless(&gpu, |h| h.texture_uploads(t1.raw())), 1);

        // One new allocation, two resolves: exactly one more upload.
        atlas.allocate(&image(3, 3, 4), 3, 3).unwrap();
        assert!(atlas.is_dirty(alloc.page()));
        let (t3, _) = atlas.resolve(&gpu, &alloc).unwrap();
        atlas.resolve(&gpu, &alloc).unwrap();
        assert_eq!(t3.raw(), t1.raw());
        assert_eq!(with_headless(&gpu, |h| h.texture_uploads(t1.raw())), 2);
        assert_eq!(atlas.stats().uploads, 2);
    }

    #[test]
    fn resolved_texture_holds_allocated_pixels() {
        let gpu = headless();
        let mut atlas = Atlas::new(16);
        atlas.allocate(&image(5, 5, 7), 5, 5).unwrap();
        let p = image(3, 2, 42);
        let s = atlas.allocate(&p, 3, 2).unwrap();
        let alloc = *s.allocation().unwrap();

        let (texture, rect) = atlas.resolve(&gpu, &alloc).unwrap();
        assert_eq!(rect, alloc.rect());

        let uploaded = with_headless(&gpu, |h| h.texture_pixels(texture.raw()).unwrap().to_vec());
        let stride = 16 * 4;
        for row in 0..2usize {
            let start = (rect.y as usize + row) * stride + rect.x as usize * 4;
            assert_eq!(&uploaded[start..start + 12], &p[row * 12..row * 12 + 12]);
        }
    }

    #[test]
    fn flush_uploads_only_dirty_resolved_pages() {
        let gpu = headless();
        let mut atlas = Atlas::new(16);
        let s = atlas.allocate(&image(2, 2, 0), 2, 2).unwrap();
        atlas.flush(&gpu).unwrap();
        assert!(atlas.page_texture(PageId(0)).is_none());

        let (texture, _) = atlas.resolve(&gpu, s.allocation().unwrap()).unwrap();
        atlas.allocate(&image(2, 2, 1), 2, 2).unwrap();
        atlas.flush(&gpu).unwrap();
        assert!(!atlas.is_dirty(PageId(0)));
        assert_eq!(with_headless(&gpu, |h| h.texture_uploads(texture.raw())), 2);
    }

    #[test]
    fn resolving_a_released_allocation_fails() {
        let gpu = headless();
        let mut atlas = Atlas::new(16);
        let s = atlas.allocate(&image(2, 2, 0), 2, 2).unwrap();
        let alloc = *s.allocation().unwrap();
        atlas.release(s).unwrap();
        assert!(matches!(atlas.resolve(&gpu, &alloc), Err(Error::UnknownAllocation)));
    }
}

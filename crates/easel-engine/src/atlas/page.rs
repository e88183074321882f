use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{TextureDesc, TextureFormat};
use crate::coords::PixelRect;
use crate::device::Texture;
use crate::device::handles::SharedBackend;
use crate::{Error, Result};

use super::sprite::{AllocId, PageId};

const BYTES_PER_TEXEL: usize = 4;

/// Guillotine free-rectangle packer for one square page.
///
/// Free rectangles are kept in a list whose order is part of the contract:
/// the first rectangle that fits wins, and split pieces take the place of
/// their parent, so identical call sequences give identical layouts.
#[derive(Debug, Clone)]
pub(crate) struct Packer {
    size: u32,
    free: Vec<PixelRect>,
}

impl Packer {
    pub(crate) fn new(size: u32) -> Self {
        Self {
            size,
            free: vec![PixelRect::new(0, 0, size, size)],
        }
    }

    /// Reserves space for a `w×h` image plus a one-texel gutter on its right
    /// and bottom edges. The gutter is dropped where the chosen free
    /// rectangle has no room for it, typically at the page edge.
    ///
    /// Returns the reserved rectangle (gutter included).
    pub(crate) fn reserve(&mut self, w: u32, h: u32) -> Option<PixelRect> {
        let slot = self.free.iter().position(|f| f.fits(w, h))?;
        let f = self.free[slot];

        let rw = (w + 1).min(f.w);
        let rh = (h + 1).min(f.h);
        let reserved = PixelRect::new(f.x, f.y, rw, rh);

        // Give the full leftover span to the longer leftover axis.
        let (right, below) = if f.w - rw > f.h - rh {
            (
                PixelRect::new(f.x + rw, f.y, f.w - rw, f.h),
                PixelRect::new(f.x, f.y + rh, rw, f.h - rh),
            )
        } else {
            (
                PixelRect::new(f.x + rw, f.y, f.w - rw, rh),
                PixelRect::new(f.x, f.y + rh, f.w, f.h - rh),
            )
        };

        let pieces = [right, below].into_iter().filter(|r| !r.is_empty());
        self.free.splice(slot..=slot, pieces);
        Some(reserved)
    }

    /// Returns a reserved rectangle and merges it with edge-adjacent free
    /// space where the union is itself a rectangle.
    pub(crate) fn free(&mut self, rect: PixelRect) {
        let mut merged = rect;
        while let Some((i, union)) = self
            .free
            .iter()
            .enumerate()
            .find_map(|(i, f)| merged.merge_adjacent(*f).map(|u| (i, u)))
        {
            self.free.remove(i);
            merged = union;
        }
        self.free.push(merged);
    }

    /// True when nothing is reserved.
    pub(crate) fn is_vacant(&self) -> bool {
        self.free.len() == 1 && self.free[0] == PixelRect::new(0, 0, self.size, self.size)
    }

    #[cfg(test)]
    pub(crate) fn free_rects(&self) -> &[PixelRect] {
        &self.free
    }
}

/// One atlas page: CPU pixels, packer, and a lazily created texture.
///
/// While `dirty` is false the texture (if any) holds exactly `pixels`.
pub(crate) struct AtlasPage {
    id: PageId,
    size: u32,
    pixels: Vec<u8>,
    packer: Packer,
    live: HashMap<AllocId, PixelRect>,
    texture: Option<Rc<Texture>>,
    dirty: bool,
}

impl AtlasPage {
    pub(crate) fn new(id: PageId, size: u32) -> Self {
        Self {
            id,
            size,
            pixels: vec![0; size as usize * size as usize * BYTES_PER_TEXEL],
            packer: Packer::new(size),
            live: HashMap::new(),
            texture: None,
            dirty: true,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> PageId {
        self.id
    }

    #[inline]
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub(crate) fn live_allocations(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub(crate) fn contains(&self, id: AllocId) -> bool {
        self.live.contains_key(&id)
    }

    #[inline]
    pub(crate) fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub(crate) fn texture(&self) -> Option<&Rc<Texture>> {
        self.texture.as_ref()
    }

    #[inline]
    pub(crate) fn is_vacant(&self) -> bool {
        self.packer.is_vacant()
    }

    /// Packs and copies a `w×h` RGBA image. Returns the image rectangle, or
    /// `None` when the page has no room.
    pub(crate) fn insert(&mut self, id: AllocId, pixels: &[u8], w: u32, h: u32) -> Option<PixelRect> {
        let reserved = self.packer.reserve(w, h)?;
        let rect = PixelRect::new(reserved.x, reserved.y, w, h);

        let row = w as usize * BYTES_PER_TEXEL;
        let stride = self.size as usize * BYTES_PER_TEXEL;

        // Gutter texels may hold a released neighbour's pixels.
        let reserved_row = reserved.w as usize * BYTES_PER_TEXEL;
        for y in reserved.y..reserved.bottom() {
            let start = y as usize * stride + reserved.x as usize * BYTES_PER_TEXEL;
            self.pixels[start..start + reserved_row].fill(0);
        }

        for (y, src) in pixels.chunks_exact(row).enumerate() {
            let start = (rect.y as usize + y) * stride + rect.x as usize * BYTES_PER_TEXEL;
            self.pixels[start..start + row].copy_from_slice(src);
        }

        self.live.insert(id, reserved);
        self.dirty = true;
        Some(rect)
    }

    pub(crate) fn remove(&mut self, id: AllocId) -> Result<()> {
        let reserved = self.live.remove(&id).ok_or(Error::UnknownAllocation)?;
        self.packer.free(reserved);
        Ok(())
    }

    /// Makes the GPU copy current and returns it.
    ///
    /// The whole page is uploaded; there are no partial updates.
    pub(crate) fn resolve(&mut self, gpu: &Rc<SharedBackend>) -> Result<Rc<Texture>> {
        let texture = match &self.texture {
            Some(texture) => {
                if self.dirty {
                    gpu.upload_texture(texture, &self.pixels)?;
                    log::trace!("atlas page {:?} re-uploaded", self.id);
                }
                Rc::clone(texture)
            }
            None => {
                let desc = TextureDesc {
                    width: self.size,
                    height: self.size,
                    format: TextureFormat::Rgba8Unorm,
                };
                let texture = Rc::new(gpu.create_texture(&desc, &self.pixels)?);
                log::debug!("atlas page {:?} texture created ({}px)", self.id, self.size);
                self.texture = Some(Rc::clone(&texture));
                texture
            }
        };
        self.dirty = false;
        Ok(texture)
    }

    /// True when resolving would touch the GPU.
    #[inline]
    pub(crate) fn needs_upload(&self) -> bool {
        self.texture.is_none() || self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_adds_gutter_except_at_page_edge() {
        let mut p = Packer::new(8);
        assert_eq!(p.reserve(3, 3), Some(PixelRect::new(0, 0, 4, 4)));
        // Only 4 columns remain to the right; a 4-wide image loses its gutter.
        assert_eq!(p.reserve(4, 2), Some(PixelRect::new(4, 0, 4, 3)));
    }

    #[test]
    fn full_page_image_fills_page() {
        let mut p = Packer::new(16);
        assert_eq!(p.reserve(16, 16), Some(PixelRect::new(0, 0, 16, 16)));
        assert!(p.free_rects().is_empty());
        assert_eq!(p.reserve(1, 1), None);
    }

    #[test]
    fn free_coalesces_back_to_vacant_page() {
        let mut p = Packer::new(32);
        let a = p.reserve(10, 10).unwrap();
        let b = p.reserve(5, 20).unwrap();
        let c = p.reserve(7, 3).unwrap();
        p.free(b);
        p.free(a);
        p.free(c);
        assert!(p.is_vacant(), "free list: {:?}", p.free_rects());
    }

    #[test]
    fn insert_copies_rows_into_place() {
        let mut page = AtlasPage::new(PageId(0), 4);
        let pixels: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8 + 1).collect();
        let rect = page.insert(AllocId(1), &pixels, 2, 2).unwrap();
        assert_eq!(rect, PixelRect::new(0, 0, 2, 2));

        let stride = 4 * 4;
        assert_eq!(&page.pixels()[0..8], &pixels[0..8]);
        assert_eq!(&page.pixels()[stride..stride + 8], &pixels[8..16]);
        assert!(page.pixels()[8..stride].iter().all(|&b| b == 0));
        assert!(page.is_dirty());
    }

    #[test]
    fn reused_space_clears_stale_gutter() {
        let mut page = AtlasPage::new(PageId(0), 8);
        page.insert(AllocId(1), &[255u8; 6 * 6 * 4], 6, 6).unwrap();
        page.remove(AllocId(1)).unwrap();

        let rect = page.insert(AllocId(2), &[7u8; 4 * 4 * 4], 4, 4).unwrap();
        assert_eq!(rect, PixelRect::new(0, 0, 4, 4));

        let stride = 8 * 4;
        let texel = |x: usize, y: usize| &page.pixels()[y * stride + x * 4..y * stride + x * 4 + 4];
        for i in 0..5 {
            // Right gutter column and bottom gutter row.
            assert_eq!(texel(4, i), &[0u8; 4], "column texel {i}");
            assert_eq!(texel(i, 4), &[0u8; 4], "row texel {i}");
        }
        assert_eq!(texel(3, 3), &[7u8; 4]);
        // Outside the new reservation the old pixels are untouched.
        assert_eq!(texel(5, 0), &[255u8; 4]);
    }
}

use std::rc::Rc;

use crate::atlas::Sprite;
use crate::device::Texture;

use super::{BlendMode, Color, PaintKind};

/// Where a brush takes its texels from.
#[derive(Debug, Clone, Default)]
pub enum PaintSource {
    /// No texture; the vertex color is the fill.
    #[default]
    Solid,
    /// A standalone texture owned elsewhere.
    Texture(Rc<Texture>),
    /// A sub-rectangle of an atlas page. An empty sprite samples the shared
    /// 1×1 white texture.
    Sprite(Sprite),
}

/// Cached UV normalization for a texture binding.
///
/// Shape code produces texel coordinates relative to the source image; the
/// canvas maps them into the bound texture with [`UvMetrics::map`]:
/// `((u + dx) / w, (v + dy) / h)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UvMetrics {
    /// Bound texture extent (the whole atlas page for sprites).
    pub w: f32,
    pub h: f32,
    pub inv_w: f32,
    pub inv_h: f32,
    /// Offset of the source image inside the bound texture.
    pub dx: f32,
    pub dy: f32,
    /// Extent of the source image itself.
    pub src_w: f32,
    pub src_h: f32,
}

impl UvMetrics {
    pub const IDENTITY: UvMetrics = UvMetrics {
        w: 1.0,
        h: 1.0,
        inv_w: 1.0,
        inv_h: 1.0,
        dx: 0.0,
        dy: 0.0,
        src_w: 1.0,
        src_h: 1.0,
    };

    pub fn new(w: u32, h: u32, dx: u32, dy: u32, src_w: u32, src_h: u32) -> Self {
        let w = w.max(1) as f32;
        let h = h.max(1) as f32;
        Self {
            w,
            h,
            inv_w: 1.0 / w,
            inv_h: 1.0 / h,
            dx: dx as f32,
            dy: dy as f32,
            src_w: src_w as f32,
            src_h: src_h as f32,
        }
    }

    /// Maps source texel coordinates to normalized texture coordinates.
    #[inline]
    pub fn map(&self, u: f32, v: f32) -> [f32; 2] {
        [(u + self.dx) * self.inv_w, (v + self.dy) * self.inv_h]
    }
}

/// Fill paint state. Immutable once built; a resized texture needs a new brush.
#[derive(Debug, Clone)]
pub struct Brush {
    source: PaintSource,
    color: Color,
    blend: BlendMode,
    metrics: UvMetrics,
}

impl Default for Brush {
    fn default() -> Self {
        Self::solid(Color::WHITE)
    }
}

impl Brush {
    pub fn solid(color: Color) -> Self {
        Self {
            source: PaintSource::Solid,
            color,
            blend: BlendMode::default(),
            metrics: UvMetrics::IDENTITY,
        }
    }

    /// Textured brush; `color` modulates the sampled texels.
    pub fn texture(texture: Rc<Texture>, color: Color) -> Self {
        let (w, h) = (texture.width(), texture.height());
        Self {
            source: PaintSource::Texture(texture),
            color,
            blend: BlendMode::default(),
            metrics: UvMetrics::new(w, h, 0, 0, w, h),
        }
    }

    /// Brush sampling an atlas sprite.
    pub fn sprite(sprite: Sprite, color: Color) -> Self {
        let metrics = match sprite.allocation() {
            Some(alloc) => {
                let (pw, ph) = alloc.page_extent();
                let r = alloc.rect();
                UvMetrics::new(pw, ph, r.x, r.y, r.w, r.h)
            }
            None => UvMetrics::IDENTITY,
        };
        Self {
            source: PaintSource::Sprite(sprite),
            color,
            blend: BlendMode::default(),
            metrics,
        }
    }

    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    #[inline]
    pub fn source(&self) -> &PaintSource {
        &self.source
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    #[inline]
    pub fn metrics(&self) -> UvMetrics {
        self.metrics
    }

    #[inline]
    pub fn kind(&self) -> PaintKind {
        match self.source {
            PaintSource::Solid => PaintKind::Solid,
            PaintSource::Texture(_) | PaintSource::Sprite(_) => PaintKind::Textured,
        }
    }
}

/// Stroke paint state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pen {
    color: Color,
    blend: BlendMode,
    width: f32,
}

impl Default for Pen {
    fn default() -> Self {
        Self::new(Color::WHITE, 1.0)
    }
}

impl Pen {
    /// Non-finite or negative widths collapse to zero (nothing is stroked).
    pub fn new(color: Color, width: f32) -> Self {
        let width = if width.is_finite() { width.max(0.0) } else { 0.0 };
        Self {
            color,
            blend: BlendMode::default(),
            width,
        }
    }

    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::Atlas;

    #[test]
    fn solid_brush_has_identity_metrics() {
        let b = Brush::solid(Color::RED);
        assert_eq!(b.kind(), PaintKind::Solid);
        assert_eq!(b.metrics(), UvMetrics::IDENTITY);
        assert_eq!(b.blend(), BlendMode::SourceOver);
    }

    #[test]
    fn sprite_brush_caches_page_metrics_and_offset() {
        let mut atlas = Atlas::new(64);
        let _first = atlas.allocate(&[0u8; 8 * 8 * 4], 8, 8).unwrap();
        let sprite = atlas.allocate(&[0u8; 4 * 4 * 4], 4, 4).unwrap();
        let rect = sprite.allocation().unwrap().rect();

        let b = Brush::sprite(sprite, Color::WHITE);
        let m = b.metrics();
        assert_eq!(b.kind(), PaintKind::Textured);
        assert_eq!((m.w, m.h), (64.0, 64.0));
        assert_eq!((m.dx, m.dy), (rect.x as f32, rect.y as f32));
        assert_eq!((m.src_w, m.src_h), (4.0, 4.0));

        let [u, v] = m.map(4.0, 4.0);
        assert_eq!(u, (rect.x as f32 + 4.0) / 64.0);
        assert_eq!(v, (rect.y as f32 + 4.0) / 64.0);
    }

    #[test]
    fn empty_sprite_brush_is_textured_with_identity_metrics() {
        let b = Brush::sprite(Sprite::default(), Color::WHITE);
        assert_eq!(b.kind(), PaintKind::Textured);
        assert_eq!(b.metrics(), UvMetrics::IDENTITY);
    }

    #[test]
    fn pen_rejects_bad_widths() {
        assert_eq!(Pen::new(Color::BLACK, -2.0).width(), 0.0);
        assert_eq!(Pen::new(Color::BLACK, f32::NAN).width(), 0.0);
        assert_eq!(Pen::new(Color::BLACK, 3.5).width(), 3.5);
    }
}

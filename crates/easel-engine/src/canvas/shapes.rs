//! Shape helpers on top of the point stream.
//!
//! Helpers emit triangle-list vertices straight into the pending run, so any
//! number of shapes under one state end up in a single draw. Fills paint
//! with the brush, strokes with the pen.

use crate::atlas::Sprite;
use crate::coords::{Rect, Vec2};
use crate::paint::{Brush, Color};
use crate::pipeline::PaintVertex;
use crate::Result;

use super::{Painter, Slot};

impl Painter<'_> {
    /// Fills `rect` with the brush. Textured brushes stretch their whole
    /// source image over the rectangle.
    pub fn fill_rect(&mut self, rect: Rect) -> Result<()> {
        let state = self.state_for(Slot::Fill)?;
        let rect = rect.normalized();
        if rect.is_empty() {
            return Ok(());
        }

        let m = state.metrics();
        let uvs = [
            m.map(0.0, 0.0),
            m.map(m.src_w, 0.0),
            m.map(m.src_w, m.src_h),
            m.map(0.0, m.src_h),
        ];
        self.push_quad(rect.corners(), uvs, state.color());
        Ok(())
    }

    /// Paints `sprite` into `dest`, modulated by `tint`.
    ///
    /// Replaces the brush with a sprite brush keeping the current blend mode.
    pub fn draw_sprite(&mut self, sprite: &Sprite, dest: Rect, tint: Color) -> Result<()> {
        let blend = self.brush.blend();
        self.set_brush(Brush::sprite(*sprite, tint).with_blend(blend))?;
        self.fill_rect(dest)
    }

    /// Strokes the segment `a`–`b` with the pen, square-ended at the points.
    ///
    /// Zero-length segments and zero-width pens paint nothing.
    pub fn stroke_line(&mut self, a: Vec2, b: Vec2) -> Result<()> {
        let state = self.state_for(Slot::Stroke)?;
        let half = self.pen.width() * 0.5;
        let Some(dir) = (b - a).normalized() else {
            return Ok(());
        };
        if half <= 0.0 {
            return Ok(());
        }

        let n = dir.perp() * half;
        self.push_quad([a - n, b - n, b + n, a + n], [[0.0; 2]; 4], state.color());
        Ok(())
    }

    /// Strokes the outline of `rect`, centered on its edges.
    pub fn stroke_rect(&mut self, rect: Rect) -> Result<()> {
        let state = self.state_for(Slot::Stroke)?;
        let w = self.pen.width();
        let rect = rect.normalized();
        if w <= 0.0 || rect.is_empty() {
            return Ok(());
        }

        let half = w * 0.5;
        let outer = Rect::new(
            rect.origin.x - half,
            rect.origin.y - half,
            rect.size.x + w,
            rect.size.y + w,
        );
        let (x, y, ow, oh) = (outer.origin.x, outer.origin.y, outer.size.x, outer.size.y);

        let mut edges = vec![
            Rect::new(x, y, ow, w),
            Rect::new(x, y + oh - w, ow, w),
        ];
        let side = oh - 2.0 * w;
        if side > 0.0 {
            edges.push(Rect::new(x, y + w, w, side));
            edges.push(Rect::new(x + ow - w, y + w, w, side));
        }

        for edge in edges {
            self.push_quad(edge.corners(), [[0.0; 2]; 4], state.color());
        }
        Ok(())
    }

    fn push_quad(&mut self, corners: [Vec2; 4], uvs: [[f32; 2]; 4], color: Color) {
        let v: [PaintVertex; 4] =
            std::array::from_fn(|i| PaintVertex::new(corners[i].x, corners[i].y, uvs[i], color));
        self.push_triangles(&[v[0], v[1], v[2], v[0], v[2], v[3]]);
    }
}

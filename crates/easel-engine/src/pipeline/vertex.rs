use bytemuck::{Pod, Zeroable};

use crate::backend::{VertexAttribute, VertexLayout};
use crate::paint::Color;

/// One 2D paint point as stored in the vertex buffer (36 bytes).
///
///  offset  0  position  [f32; 3]   loc 0
///  offset 12  uv        [f32; 2]   loc 1
///  offset 20  color     [f32; 4]   loc 2
///
/// Field order is shared with the builtin shaders; changing it requires
/// recompiling every cached pipeline.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct PaintVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl PaintVertex {
    pub const SIZE: usize = std::mem::size_of::<PaintVertex>();

    #[inline]
    pub fn new(x: f32, y: f32, uv: [f32; 2], color: Color) -> Self {
        Self {
            position: [x, y, 0.0],
            uv,
            color: color.to_array(),
        }
    }
}

const PAINT_VERTEX_ATTRS: [VertexAttribute; 3] = [
    VertexAttribute { location: 0, offset: 0, components: 3 },
    VertexAttribute { location: 1, offset: 12, components: 2 },
    VertexAttribute { location: 2, offset: 20, components: 4 },
];

/// Vertex layout of [`PaintVertex`].
pub const PAINT_VERTEX_LAYOUT: VertexLayout = VertexLayout {
    stride: PaintVertex::SIZE as u64,
    attributes: &PAINT_VERTEX_ATTRS,
};

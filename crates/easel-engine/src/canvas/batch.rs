use std::rc::Rc;

use crate::backend::{DrawDesc, RawTexture};
use crate::device::{DescriptorArray, Pipeline};
use crate::paint::{BlendMode, Color, PaintKind, UvMetrics};

/// The state a run of vertices was painted with.
///
/// Two runs can share a draw only when their states compare equal; textures
/// compare by backend identity.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum PaintState {
    Fill {
        kind: PaintKind,
        blend: BlendMode,
        texture: Option<RawTexture>,
        color: Color,
        metrics: UvMetrics,
    },
    Stroke {
        blend: BlendMode,
        color: Color,
        width: f32,
    },
}

impl PaintState {
    #[inline]
    pub(crate) fn kind(&self) -> PaintKind {
        match self {
            PaintState::Fill { kind, .. } => *kind,
            PaintState::Stroke { .. } => PaintKind::Solid,
        }
    }

    #[inline]
    pub(crate) fn blend(&self) -> BlendMode {
        match self {
            PaintState::Fill { blend, .. } | PaintState::Stroke { blend, .. } => *blend,
        }
    }

    #[inline]
    pub(crate) fn color(&self) -> Color {
        match self {
            PaintState::Fill { color, .. } | PaintState::Stroke { color, .. } => *color,
        }
    }

    #[inline]
    pub(crate) fn metrics(&self) -> UvMetrics {
        match self {
            PaintState::Fill { metrics, .. } => *metrics,
            PaintState::Stroke { .. } => UvMetrics::IDENTITY,
        }
    }
}

/// One flushed run: a contiguous vertex range under one pipeline/binding.
///
/// Holds its pipeline and descriptors, so they stay alive until the canvas
/// starts its next bracket even if the cache replaced them.
#[derive(Clone)]
pub struct DrawCall {
    pub(crate) pipeline: Rc<Pipeline>,
    pub(crate) descriptors: Option<Rc<DescriptorArray>>,
    pub(crate) first_vertex: u32,
    pub(crate) vertex_count: u32,
}

impl DrawCall {
    #[inline]
    pub fn pipeline(&self) -> &Rc<Pipeline> {
        &self.pipeline
    }

    #[inline]
    pub fn kind(&self) -> PaintKind {
        self.pipeline.kind()
    }

    /// Texture bound for this draw, if textured.
    pub fn texture(&self) -> Option<RawTexture> {
        self.descriptors.as_ref().map(|d| d.texture().raw())
    }

    #[inline]
    pub fn first_vertex(&self) -> u32 {
        self.first_vertex
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub(crate) fn desc(&self) -> DrawDesc {
        DrawDesc {
            pipeline: self.pipeline.raw(),
            descriptors: self.descriptors.as_ref().map(|d| d.raw()),
            first_vertex: self.first_vertex,
            vertex_count: self.vertex_count,
        }
    }
}

impl std::fmt::Debug for DrawCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawCall")
            .field("pipeline", &self.pipeline.raw())
            .field("texture", &self.texture())
            .field("first_vertex", &self.first_vertex)
            .field("vertex_count", &self.vertex_count)
            .finish()
    }
}

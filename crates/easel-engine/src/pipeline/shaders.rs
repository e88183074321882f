use crate::backend::{PipelineDesc, RenderPass, ShaderStage, UniformLayout};
use crate::paint::PaintKind;

use super::{PipelineKey, PAINT_VERTEX_LAYOUT};

const SOLID_WGSL: &str = include_str!("shaders/paint_solid.wgsl");
const TEXTURED_WGSL: &str = include_str!("shaders/paint_textured.wgsl");

const VS_ENTRY: &str = "vs_main";
const FS_ENTRY: &str = "fs_main";

/// Fixed shader pair and uniform layout of one paint kind.
#[derive(Debug, Copy, Clone)]
pub struct BuiltinShader {
    pub label: &'static str,
    pub source: &'static str,
    pub uniform_layout: UniformLayout,
}

impl BuiltinShader {
    pub const fn for_kind(kind: PaintKind) -> Self {
        match kind {
            PaintKind::Solid => Self {
                label: "easel solid paint",
                source: SOLID_WGSL,
                uniform_layout: UniformLayout::Empty,
            },
            PaintKind::Textured => Self {
                label: "easel textured paint",
                source: TEXTURED_WGSL,
                uniform_layout: UniformLayout::SingleTexture,
            },
        }
    }

    pub(crate) fn desc(&self, key: PipelineKey, pass: RenderPass, width: u32, height: u32) -> PipelineDesc<'static> {
        PipelineDesc {
            label: self.label,
            pass,
            kind: key.kind,
            blend: key.blend,
            vertex_layout: &PAINT_VERTEX_LAYOUT,
            uniform_layout: self.uniform_layout,
            vertex: ShaderStage {
                label: self.label,
                source: self.source,
                entry_point: VS_ENTRY,
            },
            fragment: ShaderStage {
                label: self.label,
                source: self.source,
                entry_point: FS_ENTRY,
            },
            width,
            height,
        }
    }
}

//! Paint pipelines.
//!
//! Scope:
//! - the vertex contract shared by the canvas and the builtin shaders
//! - builtin WGSL shaders and their uniform layouts
//! - the per-device pipeline cache

mod cache;
mod shaders;
mod vertex;

pub use cache::{CacheStats, PipelineCache, PipelineKey};
pub use shaders::BuiltinShader;
pub use vertex::{PAINT_VERTEX_LAYOUT, PaintVertex};

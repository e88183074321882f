//! Paint parameters.
//!
//! Scope:
//! - color representation (linear premultiplied alpha)
//! - blend modes and the paint-kind split (solid vs textured)
//! - `Brush` (fill) and `Pen` (stroke) bundles consumed by the canvas
//!
//! Geometry types remain in `coords`.

mod brush;
mod color;

pub use brush::{Brush, PaintSource, Pen, UvMetrics};
pub use color::Color;

/// Whether a paint state needs a texture binding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PaintKind {
    Solid,
    Textured,
}

/// Framebuffer blend equation for a paint state.
///
/// All modes assume premultiplied source colors.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Porter-Duff "over".
    #[default]
    SourceOver,
    /// `dst + src`.
    Additive,
    /// `src * dst + dst * (1 - src.a)`.
    Multiply,
    /// Overwrite the destination.
    Replace,
}

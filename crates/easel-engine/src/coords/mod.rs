//! Geometry types.
//!
//! Canonical CPU space for painting:
//! - logical pixels of the paint target
//! - origin top-left, +X right, +Y down
//!
//! The builtin shaders convert to NDC using the target shape baked into the
//! pipeline. Atlas bookkeeping uses integer texel rectangles (`PixelRect`).

mod pixel_rect;
mod rect;
mod vec2;

pub use pixel_rect::PixelRect;
pub use rect::Rect;
pub use vec2::Vec2;

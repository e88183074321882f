//! Easel engine crate.
//!
//! This crate owns the GPU-resource and 2D paint batching core:
//! backend handles, the sprite atlas, the builtin pipeline cache, and the
//! canvas that turns drawing commands into batched submissions.

pub mod atlas;
pub mod backend;
pub mod canvas;
pub mod coords;
pub mod device;
pub mod logging;
pub mod paint;
pub mod pipeline;

mod error;

pub use error::{Error, Result};

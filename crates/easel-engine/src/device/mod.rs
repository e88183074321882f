//! Device and backend-object ownership.
//!
//! This module is responsible for:
//! - building the configured backend (`Device`, `DeviceConfig`)
//! - RAII wrappers over raw backend ids (`Pipeline`, `Texture`,
//!   `DescriptorArray`, `VertexBuffer`)
//! - swapchains and the per-cycle `Frame` binding

mod config;
mod context;
mod frame;
pub(crate) mod handles;

pub use config::{BackendKind, DeviceConfig};
pub use context::Device;
pub use frame::{Frame, Swapchain};
pub use handles::{DescriptorArray, Pipeline, Texture, VertexBuffer};

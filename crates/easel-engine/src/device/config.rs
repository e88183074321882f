use std::time::Duration;

use crate::backend::{HeadlessInit, WgpuInit};

/// Which backend a [`super::Device`] runs on.
///
/// Chosen once at construction; lives as long as the device.
#[derive(Debug, Clone)]
pub enum BackendKind {
    Wgpu(WgpuInit),
    Headless(HeadlessInit),
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Wgpu(WgpuInit::default())
    }
}

/// Construction parameters for a [`super::Device`].
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub backend: BackendKind,

    /// Edge length of square atlas pages, in texels.
    ///
    /// Also the largest sprite the atlas accepts.
    pub atlas_page_size: u32,

    /// Upper bound on a frame acquire.
    pub frame_timeout: Duration,

    /// Vertex capacity of a canvas buffer before it first grows.
    pub initial_vertex_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            atlas_page_size: 1024,
            frame_timeout: Duration::from_millis(1000),
            initial_vertex_capacity: 1024,
        }
    }
}

impl DeviceConfig {
    /// Defaults with the in-memory backend.
    pub fn headless() -> Self {
        Self {
            backend: BackendKind::Headless(HeadlessInit::default()),
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_atlas_page_size(mut self, size: u32) -> Self {
        self.atlas_page_size = size;
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Defaults overlaid with `EASEL_BACKEND`, `EASEL_ATLAS_PAGE_SIZE` and
    /// `EASEL_FRAME_TIMEOUT_MS`. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("EASEL_BACKEND") {
            match value.trim().to_ascii_lowercase().as_str() {
                "wgpu" => config.backend = BackendKind::Wgpu(WgpuInit::default()),
                "headless" => config.backend = BackendKind::Headless(HeadlessInit::default()),
                other => log::warn!("EASEL_BACKEND: unknown backend {other:?}; using default"),
            }
        }

        if let Some(value) = lookup("EASEL_ATLAS_PAGE_SIZE") {
            match value.trim().parse::<u32>() {
                Ok(size) if size > 0 => config.atlas_page_size = size,
                _ => log::warn!("EASEL_ATLAS_PAGE_SIZE: invalid value {value:?}; ignored"),
            }
        }

        if let Some(value) = lookup("EASEL_FRAME_TIMEOUT_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.frame_timeout = Duration::from_millis(ms),
                Err(_) => log::warn!("EASEL_FRAME_TIMEOUT_MS: invalid value {value:?}; ignored"),
            }
        }

        config
    }
}

use std::time::Duration;

use thiserror::Error;

use crate::paint::PaintKind;

/// Errors surfaced by the engine.
///
/// Every error is returned at the call that caused it; nothing is deferred
/// to a later flush.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The image is larger than an atlas page. Place it in its own texture.
    #[error("image {width}x{height} exceeds the atlas page size {max}x{max}")]
    OutOfAtlasSpace { width: u32, height: u32, max: u32 },

    /// The backend rejected the pipeline. Not retried.
    #[error("failed to compile {kind:?} pipeline: {reason}")]
    PipelineCompileFailed { kind: PaintKind, reason: String },

    /// A frame was used after it was consumed or after a newer acquire.
    #[error("frame is stale (already consumed or superseded by a newer acquire)")]
    StaleFrame,

    /// No presentable image became available within the configured bound.
    #[error("timed out after {0:?} waiting for a presentable image")]
    FrameAcquireTimeout(Duration),

    /// The graphics backend is unavailable or was lost.
    #[error("graphics device unavailable: {0}")]
    NoDevice(String),

    /// Pixel buffer length does not match `width * height * 4`.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    PixelSizeMismatch { expected: usize, actual: usize },

    /// The allocation was already released or belongs to another atlas.
    #[error("unknown or already released atlas allocation")]
    UnknownAllocation,

    /// A frame was presented without a submission.
    #[error("frame presented before any submission")]
    FrameNotSubmitted,

    /// A canvas was submitted while its paint bracket is still open or was abandoned.
    #[error("canvas has no finished paint bracket")]
    PaintNotFinished,

    /// The canvas was painted for another target size than the frame has.
    #[error("canvas painted at {canvas:?} but frame is {frame:?}")]
    TargetSizeMismatch { canvas: (u32, u32), frame: (u32, u32) },

    /// The selected backend cannot perform the operation.
    #[error("unsupported by this backend: {0}")]
    Unsupported(&'static str),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// True when retrying on the next render cycle may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::FrameAcquireTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

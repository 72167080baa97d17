//! Error type shared by the sink's internal operations.
//!
//! The frame-sink boundary never lets these escape: `open` and `push` log the
//! error and report `false` to the video pipeline instead.

use thiserror::Error;

use crate::vnc::framebuffer::PixelFormat;

/// Errors raised while bridging decoded frames and remote input.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The decoder produced a pixel format the converter cannot read.
    #[error("unsupported source pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    /// Frame dimensions outside the range a converter can be built for.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u16, height: u16 },

    /// A source plane holds fewer bytes than its stride and row count require.
    #[error("plane {plane} too small: expected {expected} bytes, got {actual}")]
    FrameTooSmall {
        plane: usize,
        expected: usize,
        actual: usize,
    },

    /// The remote display library rejected a resize or update.
    #[error("remote display error: {0}")]
    Display(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another thread panicked while holding the shared screen lock.
    #[error("shared screen state poisoned")]
    StatePoisoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;

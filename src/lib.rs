//! VNC frame sink for a screen-mirroring pipeline.
//!
//! Decoded video frames are converted to RGBA and published as a VNC desktop
//! through `rustvncserver`; pointer and keyboard input from VNC clients is
//! translated into touch-injection messages and key events for the device.
//!
//! # Modules
//!
//! - `sink`: the [`FrameSink`] implementation and server lifecycle.
//! - `vnc`: frame conversion, framebuffer management and input translation.
//! - `control`: messages and collaborators on the device side.
//! - `config`, `error`, `logging`: ambient configuration, errors and logger setup.

pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod sink;
pub mod vnc;

pub use config::SinkConfig;
pub use control::{ControlMsg, Controller, KeyEvent, KeyProcessor};
pub use error::{Result, SinkError};
pub use sink::{FrameSink, VncSink};
pub use vnc::framebuffer::{Frame, PixelFormat};

//! Bridging between the decoded video stream and the VNC server.
//!
//! # Architecture
//!
//! - **`convert`**: YUV420P to RGBA pixel conversion
//! - **`framebuffer`**: the published framebuffer, resized to follow the stream
//! - **`pointer`**: pointer events to single-finger touch injection
//! - **`keyboard`**: keysyms to device keycodes with shift tracking
//! - **`input`**: routes server input events through the translators
//!
//! # Example Flow
//!
//! ```ignore
//! // Video thread
//! frames.open(PixelFormat::Yuv420p)?;
//! frames.push(&frame)?; // converts, then marks the whole framebuffer modified
//!
//! // Server event task
//! input.handle_server_event(event); // touch -> controller, keys -> key processor
//! ```

pub mod convert;
pub mod framebuffer;
pub mod input;
pub mod keyboard;
pub mod pointer;

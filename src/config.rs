//! Sink configuration and the fixed framebuffer constants.

use crate::error::{Result, SinkError};

/// Default VNC listening port.
pub const DEFAULT_PORT: u16 = 5900;

/// Side length of the framebuffer published before the first frame arrives.
pub const PLACEHOLDER_SIZE: u16 = 32;

/// The framebuffer is always packed RGBA.
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest framebuffer side accepted by the converter.
pub const MAX_DIMENSION: u16 = 8192;

/// Parameters for [`VncSink::new`](crate::sink::VncSink::new).
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Desktop name announced to VNC clients (usually the device name).
    pub desktop_name: String,
    /// Listening port. `None` starts the server without an inbound listener.
    pub port: Option<u16>,
    /// VNC password; `None` or an empty string disables authentication.
    pub password: Option<String>,
    /// Map the `|` keysym to the backslash key instead of the single-quote key.
    pub pipe_to_backslash: bool,
}

impl SinkConfig {
    pub fn new(desktop_name: impl Into<String>) -> Self {
        Self {
            desktop_name: desktop_name.into(),
            port: Some(DEFAULT_PORT),
            password: None,
            pipe_to_backslash: false,
        }
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Checks the configuration before any server resources are created.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidConfig`] for an empty desktop name or port 0.
    pub fn validate(&self) -> Result<()> {
        if self.desktop_name.trim().is_empty() {
            return Err(SinkError::InvalidConfig("desktop name must not be empty".into()));
        }
        if self.port == Some(0) {
            return Err(SinkError::InvalidConfig(
                "port must be 1-65535 (or None to disable the listener)".into(),
            ));
        }
        Ok(())
    }

    /// The password to hand to the server, with empty strings treated as unset.
    pub fn effective_password(&self) -> Option<String> {
        self.password.clone().filter(|pw| !pw.is_empty())
    }
}

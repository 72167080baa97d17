//! The VNC frame sink: publishes decoded frames through `rustvncserver` and
//! feeds remote input back to the device.
//!
//! This module owns the server lifecycle. It starts the VNC server with a
//! placeholder framebuffer, runs the listener and the event handler on a shared
//! Tokio runtime, and exposes the [`FrameSink`] interface the video pipeline
//! pushes frames into.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use once_cell::sync::OnceCell;
use rustvncserver::server::ServerEvent;
use rustvncserver::VncServer;
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, mpsc};

use crate::config::{SinkConfig, BYTES_PER_PIXEL, PLACEHOLDER_SIZE};
use crate::control::{Controller, KeyProcessor, Size};
use crate::error::{Result, SinkError};
use crate::vnc::framebuffer::{
    Frame, FramebufferManager, PixelFormat, RemoteDisplay, Screen, ScreenSize, SharedScreen,
};
use crate::vnc::input::InputBridge;

/// Global Tokio runtime for the VNC server tasks.
static VNC_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Initializes or retrieves the shared multi-threaded runtime.
fn get_or_init_vnc_runtime() -> Result<&'static Runtime> {
    VNC_RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("vnc-sink")
            .build()
            .map_err(SinkError::from)
    })
}

/// Consumer side of a decoded video stream.
///
/// `open` is called once before any `push`. A `false` from either is terminal
/// for that call; the caller decides whether to abort the stream.
pub trait FrameSink {
    fn open(&mut self, format: PixelFormat) -> bool;
    fn close(&mut self);
    fn push(&mut self, frame: &Frame<'_>) -> bool;
}

impl<D: RemoteDisplay> FrameSink for FramebufferManager<D> {
    fn open(&mut self, format: PixelFormat) -> bool {
        match FramebufferManager::open(self, format) {
            Ok(()) => true,
            Err(e) => {
                error!("Cannot open frame sink: {}", e);
                false
            }
        }
    }

    fn close(&mut self) {
        FramebufferManager::close(self);
    }

    fn push(&mut self, frame: &Frame<'_>) -> bool {
        match FramebufferManager::push(self, frame) {
            Ok(()) => true,
            Err(e) => {
                error!("Could not push frame: {}", e);
                false
            }
        }
    }
}

/// [`RemoteDisplay`] backed by a running `rustvncserver` instance.
///
/// The server's framebuffer API is async; calls are driven to completion on
/// the shared runtime, so they must come from a thread outside it (the video
/// thread).
pub struct RfbDisplay {
    server: Arc<VncServer>,
    runtime: &'static Runtime,
}

impl RfbDisplay {
    pub fn new(server: Arc<VncServer>, runtime: &'static Runtime) -> Self {
        Self { server, runtime }
    }
}

impl RemoteDisplay for RfbDisplay {
    fn new_framebuffer(&self, width: u16, height: u16) -> Result<()> {
        self.runtime
            .block_on(self.server.framebuffer().resize(width, height))
            .map_err(|e| SinkError::Display(e.to_string()))
    }

    /// Only whole-frame updates are supported; the sink never tracks damage
    /// at a finer grain.
    fn mark_modified(&self, pixels: &[u8], x: u16, y: u16, width: u16, height: u16) -> Result<()> {
        if !is_full_frame(pixels, x, y, width, height) {
            return Err(SinkError::Display(format!(
                "partial update {}x{}+{}+{} not supported",
                width, height, x, y
            )));
        }

        self.runtime
            .block_on(self.server.framebuffer().update_from_slice(pixels))
            .map_err(|e| SinkError::Display(e.to_string()))
    }
}

fn is_full_frame(pixels: &[u8], x: u16, y: u16, width: u16, height: u16) -> bool {
    x == 0 && y == 0 && pixels.len() == width as usize * height as usize * BYTES_PER_PIXEL
}

/// A VNC server mirroring the decoded video stream.
///
/// Dropping the sink stops the listener and the event handler; the
/// framebuffer and converter are released with it.
pub struct VncSink {
    frames: FramebufferManager<RfbDisplay>,
    server: Arc<VncServer>,
    size: ScreenSize,
    shutdown: broadcast::Sender<()>,
}

impl VncSink {
    /// Starts a VNC server named after the device and wires remote input to
    /// `controller` (pointer) and `key_processor` (keyboard).
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the runtime cannot be built.
    pub fn new(
        config: SinkConfig,
        controller: Arc<dyn Controller>,
        key_processor: Option<Arc<dyn KeyProcessor>>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = get_or_init_vnc_runtime()?;

        match config.port {
            Some(port) => info!("Starting VNC sink '{}' on port {}", config.desktop_name, port),
            None => info!("Starting VNC sink '{}' (inbound connections disabled)", config.desktop_name),
        }

        let (server, event_rx) = VncServer::new(
            PLACEHOLDER_SIZE,
            PLACEHOLDER_SIZE,
            config.desktop_name.clone(),
            config.effective_password(),
        );
        let server = Arc::new(server);
        let (shutdown, _) = broadcast::channel(4);

        let screen = Screen::placeholder();
        let size = screen.size_handle();
        let screen: SharedScreen = Arc::new(Mutex::new(screen));
        let input = InputBridge::new(
            size.clone(),
            controller,
            key_processor,
            config.pipe_to_backslash,
        );
        spawn_event_handler(runtime, input, event_rx, shutdown.subscribe());

        if let Some(port) = config.port {
            let listener = server.clone();
            let mut shutdown_rx = shutdown.subscribe();
            runtime.spawn(async move {
                tokio::select! {
                    result = listener.listen(port) => {
                        if let Err(e) = result {
                            error!("VNC server listen error: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("VNC listener received shutdown signal");
                    }
                }
            });
        }

        let display = RfbDisplay::new(server.clone(), runtime);
        Ok(Self {
            frames: FramebufferManager::new(display, screen),
            server,
            size,
            shutdown,
        })
    }

    pub fn server(&self) -> &Arc<VncServer> {
        &self.server
    }

    pub fn screen(&self) -> &SharedScreen {
        self.frames.screen()
    }

    /// Current framebuffer size, as used for pointer coordinates.
    pub fn screen_size(&self) -> Size {
        self.size.get()
    }
}

impl FrameSink for VncSink {
    fn open(&mut self, format: PixelFormat) -> bool {
        FrameSink::open(&mut self.frames, format)
    }

    fn close(&mut self) {
        FrameSink::close(&mut self.frames);
    }

    fn push(&mut self, frame: &Frame<'_>) -> bool {
        FrameSink::push(&mut self.frames, frame)
    }
}

impl Drop for VncSink {
    fn drop(&mut self) {
        info!("Stopping VNC sink");
        if self.shutdown.send(()).is_err() {
            warn!("VNC sink tasks already stopped");
        }
    }
}

/// Spawns the task that feeds server events into the input bridge until
/// shutdown is signalled.
fn spawn_event_handler(
    runtime: &Runtime,
    mut input: InputBridge,
    mut event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    runtime.spawn(async move {
        info!("VNC event handler started");

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(event) => input.handle_server_event(event),
                    None => {
                        info!("VNC server event channel closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Event handler received shutdown signal");
                    break;
                }
            }
        }

        info!("VNC event handler stopped");
    });
}

//! Framebuffer management.
//!
//! The [`Screen`] holds the RGBA pixels published to VNC clients together with
//! the converter that fills them. It is shared between the video thread, which
//! resizes and repaints it, and the server's event loop, which reads its size to
//! build pointer coordinates. The video thread does all its work under the
//! screen mutex; the event loop only reads a [`ScreenSize`], a single atomic
//! word published under that mutex, so it never waits on a framebuffer update
//! and never sees a width from one resize with a height from another.
//!
//! Every push invalidates the whole framebuffer; the decoder gives no damage
//! information to narrow it down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::config::{BYTES_PER_PIXEL, PLACEHOLDER_SIZE};
use crate::control::Size;
use crate::error::{Result, SinkError};
use super::convert::PixelConverter;

/// Pixel formats a decoder may announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar 4:2:0 YUV, three planes. The only format the sink accepts.
    Yuv420p,
    Nv12,
    Rgba,
}

/// A decoded video frame, borrowed from the decoder for the duration of a push.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    /// Y, U and V planes.
    pub planes: [&'a [u8]; 3],
    /// Bytes between the starts of consecutive rows, per plane.
    pub strides: [usize; 3],
}

/// The remote display server the framebuffer is published through.
pub trait RemoteDisplay: Send + Sync {
    /// Announces a new framebuffer size to the server and its clients.
    fn new_framebuffer(&self, width: u16, height: u16) -> Result<()>;

    /// Publishes `pixels` (the whole RGBA framebuffer) and marks the given
    /// rectangle as modified.
    fn mark_modified(&self, pixels: &[u8], x: u16, y: u16, width: u16, height: u16) -> Result<()>;
}

impl<D: RemoteDisplay + ?Sized> RemoteDisplay for Arc<D> {
    fn new_framebuffer(&self, width: u16, height: u16) -> Result<()> {
        (**self).new_framebuffer(width, height)
    }

    fn mark_modified(&self, pixels: &[u8], x: u16, y: u16, width: u16, height: u16) -> Result<()> {
        (**self).mark_modified(pixels, x, y, width, height)
    }
}

/// Lock-free view of the current framebuffer dimensions.
#[derive(Debug, Clone)]
pub struct ScreenSize(Arc<AtomicU32>);

impl ScreenSize {
    fn new(size: Size) -> Self {
        Self(Arc::new(AtomicU32::new(pack(size))))
    }

    pub fn get(&self) -> Size {
        let packed = self.0.load(Ordering::Acquire);
        Size {
            width: (packed >> 16) as u16,
            height: packed as u16,
        }
    }

    fn set(&self, size: Size) {
        self.0.store(pack(size), Ordering::Release);
    }
}

fn pack(size: Size) -> u32 {
    (u32::from(size.width) << 16) | u32::from(size.height)
}

/// The live framebuffer and its converter.
///
/// Invariant: `pixels.len() == width * height * BYTES_PER_PIXEL`, and
/// `converter` is only ever `Some` for the current `width` and `height`.
#[derive(Debug)]
pub struct Screen {
    converter: Option<PixelConverter>,
    pixels: Vec<u8>,
    width: u16,
    height: u16,
    reallocations: u64,
    released: u64,
    published: ScreenSize,
}

pub type SharedScreen = Arc<Mutex<Screen>>;

impl Screen {
    /// A placeholder screen published before the first frame arrives.
    pub fn placeholder() -> Self {
        let side = PLACEHOLDER_SIZE;
        Self {
            converter: None,
            pixels: vec![0; side as usize * side as usize * BYTES_PER_PIXEL],
            width: side,
            height: side,
            reallocations: 0,
            released: 0,
            published: ScreenSize::new(Size {
                width: side,
                height: side,
            }),
        }
    }

    pub fn shared() -> SharedScreen {
        Arc::new(Mutex::new(Self::placeholder()))
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    /// A handle that follows this screen's size without taking its lock.
    pub fn size_handle(&self) -> ScreenSize {
        self.published.clone()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// How many times a framebuffer has been allocated for incoming frames.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// How many replaced framebuffers have been freed. The placeholder plus
    /// every reallocation is one allocation, so while the screen is alive
    /// `reallocations() - buffers_released() == 0` and exactly one buffer is live.
    pub fn buffers_released(&self) -> u64 {
        self.released
    }

    /// Allocates a framebuffer and converter for `width`x`height`.
    ///
    /// The new pair is only installed once both exist and the display accepted
    /// the new size; on failure the previous buffer stays in place.
    fn reallocate<D: RemoteDisplay>(&mut self, display: &D, width: u16, height: u16) -> Result<()> {
        let converter = PixelConverter::new(width, height)?;
        let pixels = vec![0; width as usize * height as usize * BYTES_PER_PIXEL];
        display.new_framebuffer(width, height)?;

        drop(std::mem::replace(&mut self.pixels, pixels));
        self.released += 1;
        self.width = width;
        self.height = height;
        self.converter = Some(converter);
        self.reallocations += 1;
        self.published.set(self.size());
        Ok(())
    }
}

/// Turns decoded frames into framebuffer updates.
pub struct FramebufferManager<D> {
    display: D,
    screen: SharedScreen,
}

impl<D: RemoteDisplay> FramebufferManager<D> {
    pub fn new(display: D, screen: SharedScreen) -> Self {
        Self { display, screen }
    }

    pub fn screen(&self) -> &SharedScreen {
        &self.screen
    }

    /// Accepts the stream only if it delivers YUV420P frames.
    ///
    /// # Errors
    ///
    /// [`SinkError::UnsupportedFormat`] for anything else; the stream cannot be
    /// served.
    pub fn open(&mut self, format: PixelFormat) -> Result<()> {
        if format != PixelFormat::Yuv420p {
            return Err(SinkError::UnsupportedFormat(format));
        }
        debug!("Frame sink opened with {:?}", format);
        Ok(())
    }

    /// Converts `frame` into the framebuffer and marks it modified.
    ///
    /// A size change reallocates the framebuffer and rebuilds the converter
    /// before converting. Modification is only signalled after conversion has
    /// completed.
    pub fn push(&mut self, frame: &Frame<'_>) -> Result<()> {
        if frame.format != PixelFormat::Yuv420p {
            return Err(SinkError::UnsupportedFormat(frame.format));
        }

        let mut screen = self.screen.lock().map_err(|_| SinkError::StatePoisoned)?;

        if (frame.width, frame.height) != (screen.width, screen.height)
            && screen.converter.take().is_some()
        {
            debug!(
                "Frame size changed {}x{} -> {}x{}, dropping converter",
                screen.width, screen.height, frame.width, frame.height
            );
        }

        if screen.converter.is_none() {
            screen.reallocate(&self.display, frame.width, frame.height)?;
            info!("Framebuffer resized to {}x{}", frame.width, frame.height);
        }

        let Screen {
            converter,
            pixels,
            width,
            height,
            ..
        } = &mut *screen;
        let Some(converter) = converter.as_ref() else {
            return Err(SinkError::InvalidDimensions {
                width: frame.width,
                height: frame.height,
            });
        };
        converter.convert(frame, pixels, *width as usize * BYTES_PER_PIXEL)?;

        self.display.mark_modified(pixels, 0, 0, *width, *height)
    }

    /// Releases the converter. The framebuffer itself stays published until
    /// the sink is dropped.
    pub fn close(&mut self) {
        match self.screen.lock() {
            Ok(mut screen) => {
                screen.converter = None;
            }
            Err(_) => debug!("Screen lock poisoned while closing"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every call the manager makes into the display.
    #[derive(Default)]
    pub(crate) struct RecordingDisplay {
        pub resizes: Mutex<Vec<(u16, u16)>>,
        pub updates: Mutex<Vec<(usize, u16, u16, u16, u16)>>,
        pub fail_resize: bool,
    }

    impl RemoteDisplay for RecordingDisplay {
        fn new_framebuffer(&self, width: u16, height: u16) -> Result<()> {
            if self.fail_resize {
                return Err(SinkError::Display("resize refused".into()));
            }
            self.resizes.lock().unwrap().push((width, height));
            Ok(())
        }

        fn mark_modified(&self, pixels: &[u8], x: u16, y: u16, width: u16, height: u16) -> Result<()> {
            self.updates
                .lock()
                .unwrap()
                .push((pixels.len(), x, y, width, height));
            Ok(())
        }
    }

    /// Owned planes for a mid-grey YUV420P frame.
    pub(crate) struct TestFrame {
        pub width: u16,
        pub height: u16,
        y: Vec<u8>,
        uv: Vec<u8>,
    }

    impl TestFrame {
        pub fn new(width: u16, height: u16) -> Self {
            let cw = (width as usize).div_ceil(2);
            let ch = (height as usize).div_ceil(2);
            Self {
                width,
                height,
                y: vec![128; width as usize * height as usize],
                uv: vec![128; cw * ch],
            }
        }

        pub fn frame(&self) -> Frame<'_> {
            let cw = (self.width as usize).div_ceil(2);
            Frame {
                width: self.width,
                height: self.height,
                format: PixelFormat::Yuv420p,
                planes: [&self.y, &self.uv, &self.uv],
                strides: [self.width as usize, cw, cw],
            }
        }
    }

    fn manager() -> (FramebufferManager<Arc<RecordingDisplay>>, Arc<RecordingDisplay>) {
        let display = Arc::new(RecordingDisplay::default());
        (FramebufferManager::new(display.clone(), Screen::shared()), display)
    }

    #[test]
    fn open_accepts_only_yuv420p() {
        let (mut fb, _) = manager();
        assert!(fb.open(PixelFormat::Yuv420p).is_ok());
        assert!(matches!(
            fb.open(PixelFormat::Nv12),
            Err(SinkError::UnsupportedFormat(PixelFormat::Nv12))
        ));
        assert!(fb.open(PixelFormat::Rgba).is_err());
    }

    #[test]
    fn placeholder_screen_is_consistent() {
        let screen = Screen::placeholder();
        assert_eq!(screen.size(), Size { width: 32, height: 32 });
        assert_eq!(screen.pixels().len(), 32 * 32 * BYTES_PER_PIXEL);
        assert!(!screen.has_converter());
    }

    #[test]
    fn constant_size_allocates_once() {
        let (mut fb, display) = manager();
        let frame = TestFrame::new(64, 48);

        for _ in 0..5 {
            fb.push(&frame.frame()).unwrap();
        }

        let screen = fb.screen().lock().unwrap();
        assert_eq!(screen.reallocations(), 1);
        assert_eq!(*display.resizes.lock().unwrap(), vec![(64, 48)]);
        assert_eq!(display.updates.lock().unwrap().len(), 5);
    }

    #[test]
    fn first_frame_at_placeholder_size_still_allocates() {
        let (mut fb, display) = manager();
        fb.push(&TestFrame::new(32, 32).frame()).unwrap();
        assert_eq!(fb.screen().lock().unwrap().reallocations(), 1);
        assert_eq!(display.resizes.lock().unwrap().len(), 1);
    }

    #[test]
    fn size_change_reallocates() {
        let (mut fb, display) = manager();
        fb.push(&TestFrame::new(64, 48).frame()).unwrap();
        fb.push(&TestFrame::new(48, 64).frame()).unwrap();
        fb.push(&TestFrame::new(48, 64).frame()).unwrap();
        fb.push(&TestFrame::new(100, 30).frame()).unwrap();

        let screen = fb.screen().lock().unwrap();
        assert_eq!(screen.reallocations(), 3);
        assert_eq!(screen.size(), Size { width: 100, height: 30 });
        assert_eq!(screen.pixels().len(), 100 * 30 * 4);
        assert_eq!(
            *display.resizes.lock().unwrap(),
            vec![(64, 48), (48, 64), (100, 30)]
        );
    }

    #[test]
    fn marks_full_frame_after_conversion() {
        let (mut fb, display) = manager();
        fb.push(&TestFrame::new(10, 6).frame()).unwrap();

        assert_eq!(*display.updates.lock().unwrap(), vec![(10 * 6 * 4, 0, 0, 10, 6)]);
        let screen = fb.screen().lock().unwrap();
        // Mid-grey converts to an opaque grey.
        assert!(screen.pixels().chunks_exact(4).all(|p| p[3] == 0xff && p[0] == p[1]));
    }

    #[test]
    fn zero_sized_frame_fails_and_keeps_previous_buffer() {
        let (mut fb, display) = manager();
        fb.push(&TestFrame::new(16, 16).frame()).unwrap();

        assert!(matches!(
            fb.push(&TestFrame::new(0, 16).frame()),
            Err(SinkError::InvalidDimensions { width: 0, height: 16 })
        ));

        let screen = fb.screen().lock().unwrap();
        assert_eq!(screen.size(), Size { width: 16, height: 16 });
        assert_eq!(screen.pixels().len(), 16 * 16 * 4);
        assert!(!screen.has_converter());
        assert_eq!(display.updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn display_failure_fails_push_then_retries() {
        let display = Arc::new(RecordingDisplay {
            fail_resize: true,
            ..Default::default()
        });
        let mut fb = FramebufferManager::new(display.clone(), Screen::shared());
        let frame = TestFrame::new(8, 8);

        assert!(fb.push(&frame.frame()).is_err());
        assert!(fb.push(&frame.frame()).is_err());

        let screen = fb.screen().lock().unwrap();
        assert_eq!(screen.reallocations(), 0);
        assert_eq!(screen.size(), Size { width: 32, height: 32 });
        assert!(display.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn close_drops_converter_and_next_push_rebuilds() {
        let (mut fb, _) = manager();
        let frame = TestFrame::new(8, 8);
        fb.push(&frame.frame()).unwrap();
        fb.close();
        assert!(!fb.screen().lock().unwrap().has_converter());

        fb.push(&frame.frame()).unwrap();
        assert_eq!(fb.screen().lock().unwrap().reallocations(), 2);
    }

    #[test]
    fn push_rejects_wrong_frame_format() {
        let (mut fb, _) = manager();
        let owned = TestFrame::new(8, 8);
        let mut frame = owned.frame();
        frame.format = PixelFormat::Nv12;
        assert!(fb.push(&frame).is_err());
    }

    #[test]
    fn every_replaced_buffer_is_released_once_and_the_last_on_drop() {
        let (mut fb, _) = manager();
        let weak = Arc::downgrade(fb.screen());
        assert!(fb.open(PixelFormat::Yuv420p).is_ok());

        for (width, height) in [(64, 48), (64, 48), (48, 64), (100, 30), (100, 30)] {
            fb.push(&TestFrame::new(width, height).frame()).unwrap();
            let screen = fb.screen().lock().unwrap();
            // Placeholder + reallocations allocated, all but the live one freed.
            assert_eq!(screen.reallocations() + 1 - screen.buffers_released(), 1);
            assert_eq!(screen.pixels().len(), width as usize * height as usize * 4);
        }
        fb.close();

        {
            let screen = fb.screen().lock().unwrap();
            assert_eq!(screen.reallocations(), 3);
            assert_eq!(screen.buffers_released(), 3);
        }

        drop(fb);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn failed_reallocation_releases_nothing() {
        let (mut fb, _) = manager();
        fb.push(&TestFrame::new(16, 16).frame()).unwrap();
        assert!(fb.push(&TestFrame::new(0, 16).frame()).is_err());

        let screen = fb.screen().lock().unwrap();
        assert_eq!(screen.buffers_released(), 1);
        assert_eq!(screen.reallocations(), 1);
    }

    #[test]
    fn size_handle_follows_resizes_without_the_lock() {
        let (mut fb, _) = manager();
        let size = fb.screen().lock().unwrap().size_handle();
        assert_eq!(size.get(), Size { width: 32, height: 32 });

        fb.push(&TestFrame::new(1080, 2400).frame()).unwrap();
        assert_eq!(size.get(), Size { width: 1080, height: 2400 });

        // Readable while the video path holds the screen lock.
        let guard = fb.screen().lock().unwrap();
        assert_eq!(size.get(), guard.size());
    }
}

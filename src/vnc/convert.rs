//! YUV420P to RGBA conversion.
//!
//! Decoded video arrives as planar 4:2:0 YUV; VNC clients are served packed
//! RGBA. A [`PixelConverter`] is bound to one set of dimensions and must be
//! rebuilt whenever the frame size changes.

use crate::config::{BYTES_PER_PIXEL, MAX_DIMENSION};
use crate::error::{Result, SinkError};
use super::framebuffer::Frame;

/// Full-frame YUV420P to RGBA converter for fixed dimensions.
#[derive(Debug)]
pub struct PixelConverter {
    width: u16,
    height: u16,
}

impl PixelConverter {
    /// Builds a converter for `width`x`height` frames.
    ///
    /// # Errors
    ///
    /// [`SinkError::InvalidDimensions`] if either side is zero or larger than
    /// [`MAX_DIMENSION`].
    pub fn new(width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(SinkError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Whether this converter can be reused for frames of the given size.
    pub fn matches(&self, width: u16, height: u16) -> bool {
        self.width == width && self.height == height
    }

    /// Converts `frame` into `dst`, writing each row `dst_stride` bytes apart.
    ///
    /// Every plane and the destination are bounds-checked up front, so on error
    /// `dst` has not been touched.
    pub fn convert(&self, frame: &Frame<'_>, dst: &mut [u8], dst_stride: usize) -> Result<()> {
        if !self.matches(frame.width, frame.height) {
            return Err(SinkError::InvalidDimensions {
                width: frame.width,
                height: frame.height,
            });
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        check_plane(0, frame.planes[0], frame.strides[0], width, height)?;
        check_plane(1, frame.planes[1], frame.strides[1], chroma_width, chroma_height)?;
        check_plane(2, frame.planes[2], frame.strides[2], chroma_width, chroma_height)?;
        // The destination is checked like a plane, reported as index 3.
        check_plane(3, dst, dst_stride, width * BYTES_PER_PIXEL, height)?;

        let [y_plane, u_plane, v_plane] = frame.planes;
        let [y_stride, u_stride, v_stride] = frame.strides;

        for row in 0..height {
            let y_row = &y_plane[row * y_stride..row * y_stride + width];
            let u_row = &u_plane[(row / 2) * u_stride..(row / 2) * u_stride + chroma_width];
            let v_row = &v_plane[(row / 2) * v_stride..(row / 2) * v_stride + chroma_width];
            let out = &mut dst[row * dst_stride..row * dst_stride + width * BYTES_PER_PIXEL];

            for (x, (&luma, pixel)) in y_row
                .iter()
                .zip(out.chunks_exact_mut(BYTES_PER_PIXEL))
                .enumerate()
            {
                let [r, g, b] = yuv_to_rgb(luma, u_row[x / 2], v_row[x / 2]);
                pixel[0] = r;
                pixel[1] = g;
                pixel[2] = b;
                pixel[3] = 0xff;
            }
        }
        Ok(())
    }
}

/// Verifies `data` holds `rows` rows of `row_len` bytes spaced `stride` apart.
fn check_plane(plane: usize, data: &[u8], stride: usize, row_len: usize, rows: usize) -> Result<()> {
    let expected = if stride < row_len {
        // Rows would overlap; report the size a tightly packed plane needs.
        row_len * rows
    } else {
        stride * (rows - 1) + row_len
    };
    if stride < row_len || data.len() < expected {
        return Err(SinkError::FrameTooSmall {
            plane,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// BT.601 limited-range conversion in 8.8 fixed point.
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

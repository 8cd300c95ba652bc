//! Raw frame buffers and pixel formats

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// 4-channel, 8-bit, alpha-inclusive pixel layouts
///
/// Only fixed-size 4-byte formats are supported so that the encoder's
/// input stream can be framed purely by byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgba,
    Bgra,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Bytes per pixel (always 4)
    pub fn bytes_per_pixel(self) -> usize {
        Self::BYTES_PER_PIXEL
    }

    /// Name of this layout in ffmpeg's `-pix_fmt` vocabulary
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
        }
    }
}

/// Size in bytes of one frame at the given resolution
pub fn frame_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

/// One captured image
#[derive(Debug, Clone)]
pub struct Frame {
    sequence: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer, checking it is exactly `width * height * 4` bytes
    pub fn new(
        sequence: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        let expected = frame_len(width, height, format);
        if data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            sequence,
            width,
            height,
            format,
            data,
        })
    }

    /// Position in capture order, assigned by the pipeline
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, rows top to bottom as read back
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Convert to an RGBA image for saving to disk
    ///
    /// `flip_vertical` applies the same flip the encoder applies, so a still
    /// image matches the recorded video.
    pub fn to_rgba_image(&self, flip_vertical: bool) -> Option<RgbaImage> {
        let mut data = self.data.clone();
        if self.format == PixelFormat::Bgra {
            for px in data.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }

        let image = RgbaImage::from_raw(self.width, self.height, data)?;
        if flip_vertical {
            Some(image::imageops::flip_vertical(&image))
        } else {
            Some(image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_is_four_bytes_per_pixel() {
        assert_eq!(frame_len(640, 480, PixelFormat::Rgba), 1_228_800);
        assert_eq!(frame_len(1, 1, PixelFormat::Bgra), 4);
        assert_eq!(frame_len(0, 480, PixelFormat::Rgba), 0);
    }

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        let err = Frame::new(0, 2, 2, PixelFormat::Rgba, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::BufferSize {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn test_rgba_image_flip_and_swizzle() {
        // Top row blue, bottom row red (BGRA byte order)
        let data = vec![
            255, 0, 0, 255, //
            0, 0, 255, 255,
        ];
        let frame = Frame::new(0, 1, 2, PixelFormat::Bgra, data).unwrap();

        let upright = frame.to_rgba_image(false).unwrap();
        assert_eq!(upright.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(upright.get_pixel(0, 1).0, [255, 0, 0, 255]);

        let flipped = frame.to_rgba_image(true).unwrap();
        assert_eq!(flipped.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(flipped.get_pixel(0, 1).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_pixel_format_names() {
        assert_eq!(PixelFormat::Rgba.ffmpeg_name(), "rgba");
        assert_eq!(PixelFormat::Bgra.ffmpeg_name(), "bgra");
        assert_eq!(PixelFormat::default(), PixelFormat::Rgba);
    }
}

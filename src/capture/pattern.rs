//! Software render target drawing animated test patterns
//!
//! Stands in for a GPU framebuffer when no host renderer is attached
//! (demo binary, tests).

use super::frame::PixelFormat;
use super::source::RenderTarget;
use crate::error::CaptureError;

/// Test pattern drawn by [`PatternTarget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    /// Every pixel the same RGBA color
    Solid([u8; 4]),
    /// Horizontal red ramp, vertical green ramp, blue cycling per frame
    Gradient,
    /// Black and white squares of `cell` pixels
    Checkerboard { cell: u32 },
    /// White vertical bar sweeping across a dark background
    #[default]
    MovingBar,
}

/// Draw one frame of `pattern` into an RGBA buffer
pub fn draw_pattern(pattern: Pattern, frame_index: u64, width: u32, height: u32, rgba: &mut [u8]) {
    let bar_x = if width == 0 {
        0
    } else {
        (frame_index % width as u64) as u32
    };
    let bar_width = (width / 16).max(1);

    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 4) as usize;
            let px = match pattern {
                Pattern::Solid(color) => color,
                Pattern::Gradient => [
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    (frame_index % 256) as u8,
                    255,
                ],
                Pattern::Checkerboard { cell } => {
                    let cell = cell.max(1);
                    if ((x / cell) + (y / cell)) % 2 == 0 {
                        [0, 0, 0, 255]
                    } else {
                        [255, 255, 255, 255]
                    }
                }
                Pattern::MovingBar => {
                    if x >= bar_x && x < bar_x + bar_width {
                        [255, 255, 255, 255]
                    } else {
                        [16, 16, 32, 255]
                    }
                }
            };
            rgba[idx..idx + 4].copy_from_slice(&px);
        }
    }
}

/// CPU render target with an RGBA canvas
pub struct PatternTarget {
    name: String,
    width: u32,
    height: u32,
    pattern: Pattern,
    frame_index: u64,
    canvas: Vec<u8>,
    canvas_size: (u32, u32),
}

impl PatternTarget {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            pattern: Pattern::default(),
            frame_index: 0,
            canvas: Vec::new(),
            canvas_size: (0, 0),
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
    }

    /// Number of frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }
}

impl RenderTarget for PatternTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        let len = width as usize * height as usize * 4;
        if self.canvas.len() != len {
            self.canvas = vec![0; len];
        }
        self.canvas_size = (width, height);

        draw_pattern(self.pattern, self.frame_index, width, height, &mut self.canvas);
        self.frame_index += 1;
        Ok(())
    }

    fn read_pixels(&mut self, format: PixelFormat, dst: &mut [u8]) -> Result<(), CaptureError> {
        if self.canvas_size == (0, 0) {
            return Err(CaptureError::Readback("nothing rendered yet".to_string()));
        }
        if dst.len() != self.canvas.len() {
            return Err(CaptureError::BufferSize {
                expected: self.canvas.len(),
                actual: dst.len(),
            });
        }

        dst.copy_from_slice(&self.canvas);
        if format == PixelFormat::Bgra {
            for px in dst.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        Ok(())
    }
}

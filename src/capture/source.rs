//! Frame source adapter over a host render target
//!
//! Rendering and readback are two separate calls on the render target so the
//! ordering boundary is explicit: a frame's pixels are only read after its
//! render call has returned.

use tracing::debug;

use super::frame::{frame_len, Frame, PixelFormat};
use crate::error::CaptureError;

/// Off-screen render target provided by the host (camera + framebuffer)
pub trait RenderTarget {
    /// Human-readable identifier of the camera/object being rendered
    fn name(&self) -> &str;

    /// Current resolution of the camera
    fn size(&self) -> (u32, u32);

    /// Render the view into the target at the given resolution. Blocking.
    fn render(&mut self, width: u32, height: u32) -> Result<(), CaptureError>;

    /// Copy the last rendered image into `dst` (`width * height * 4` bytes). Blocking.
    fn read_pixels(&mut self, format: PixelFormat, dst: &mut [u8]) -> Result<(), CaptureError>;
}

/// Trait for anything that can produce frames on demand
pub trait FrameSource {
    /// Identifier used for file names
    fn identifier(&self) -> &str;

    /// Resolution the camera renders at when not overridden
    fn native_size(&self) -> (u32, u32);

    /// Bind to a fixed resolution and pixel format for the session
    fn configure(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<(), CaptureError>;

    /// Render now, then read back now. Returns exactly one frame per call.
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;
}

#[derive(Debug, Clone, Copy)]
struct CaptureSettings {
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// Adapts a [`RenderTarget`] into a [`FrameSource`]
pub struct RenderTargetSource<T: RenderTarget> {
    target: T,
    settings: Option<CaptureSettings>,
}

impl<T: RenderTarget> RenderTargetSource<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            settings: None,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_some()
    }
}

impl<T: RenderTarget> FrameSource for RenderTargetSource<T> {
    fn identifier(&self) -> &str {
        self.target.name()
    }

    fn native_size(&self) -> (u32, u32) {
        self.target.size()
    }

    fn configure(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<(), CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidSize { width, height });
        }

        debug!(
            "Frame source '{}' configured: {}x{} {:?}",
            self.target.name(),
            width,
            height,
            format
        );
        self.settings = Some(CaptureSettings {
            width,
            height,
            format,
        });
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let settings = self.settings.ok_or(CaptureError::NotConfigured)?;

        self.target.render(settings.width, settings.height)?;

        let mut pixels = vec![0u8; frame_len(settings.width, settings.height, settings.format)];
        self.target.read_pixels(settings.format, &mut pixels)?;

        Frame::new(0, settings.width, settings.height, settings.format, pixels)
    }
}

//! Frame capture from off-screen render targets
//!
//! This module turns a host render target into a stream of raw frames:
//! - `RenderTarget` is the host-side camera/framebuffer
//! - `FrameSource` is what the pipeline pulls frames from
//! - `PatternTarget` is a software target for demos and tests

mod frame;
mod pattern;
mod source;

pub use frame::{frame_len, Frame, PixelFormat};
pub use pattern::{draw_pattern, Pattern, PatternTarget};
pub use source::{FrameSource, RenderTarget, RenderTargetSource};

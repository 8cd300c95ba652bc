//! sim-recorder
//!
//! Records the off-screen render target of a real-time simulation to video.
//! Once per rendered frame the pipeline reads the target's pixels back and
//! streams them, in order, into an ffmpeg process as raw video.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod session;

pub use capture::{Frame, FrameSource, PixelFormat, RenderTarget, RenderTargetSource};
pub use config::Config;
pub use encoder::{Backpressure, FfmpegOpener, FrameSink, SinkOpener};
pub use error::{CaptureError, RecorderError, WriteError};
pub use pipeline::{CapturePipeline, PipelineOptions, PipelineState, RenderHook};
pub use session::{Session, SessionRequest, SessionSummary};

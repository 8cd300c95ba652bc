//! Frame sinks: where captured frames go
//!
//! - `ProcessSink` writes inline into an encoder process's stdin
//! - `QueuedSink` decouples the render thread through a bounded queue
//! - `FfmpegOpener` picks between them per the backpressure policy

mod command;
mod process;
mod queue;

pub use command::{EncoderCommand, EncoderSettings};
pub use process::{EncoderHandle, ProcessSink};
pub use queue::{Backpressure, QueuedSink};

use std::time::Duration;
use tracing::debug;

use crate::capture::Frame;
use crate::error::{RecorderError, WriteError};
use crate::session::Session;

/// Consumer of a session's raw frames
pub trait FrameSink: Send {
    /// Hand one frame to the sink. Frames must arrive in capture order.
    fn write_frame(&mut self, frame: Frame) -> Result<(), WriteError>;

    /// Flush, signal end-of-input and wait for the consumer to finish.
    /// Calling it again after it has returned is a no-op.
    fn close(&mut self) -> Result<(), RecorderError>;

    /// Frames accepted so far
    fn frames_written(&self) -> u64;

    /// Frames discarded under backpressure
    fn frames_dropped(&self) -> u64 {
        0
    }

    /// Handle to the encoder process behind this sink, if there is one
    fn encoder_handle(&self) -> Option<EncoderHandle> {
        None
    }
}

/// Creates the sink for a session once its paths and size are known
pub trait SinkOpener {
    fn open(&self, session: &Session) -> Result<Box<dyn FrameSink>, RecorderError>;
}

/// Opens an ffmpeg [`ProcessSink`], queued unless the policy is `Block`
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    settings: EncoderSettings,
    backpressure: Backpressure,
    queue_capacity: usize,
}

impl FfmpegOpener {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            backpressure: Backpressure::default(),
            queue_capacity: 8,
        }
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure, queue_capacity: usize) -> Self {
        self.backpressure = backpressure;
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }
}

impl SinkOpener for FfmpegOpener {
    fn open(&self, session: &Session) -> Result<Box<dyn FrameSink>, RecorderError> {
        if session.fps == 0 {
            return Err(RecorderError::InvalidConfig(format!(
                "{} needs a frame rate of at least 1 fps",
                self.settings.program
            )));
        }
        let sink = ProcessSink::open(session, &self.settings)?;

        match self.backpressure {
            Backpressure::Block => Ok(Box::new(sink)),
            policy => {
                debug!(
                    "Queueing frames ({:?}, capacity {})",
                    policy, self.queue_capacity
                );
                let drain_timeout = Duration::from_secs(self.settings.close_timeout_secs);
                Ok(Box::new(
                    QueuedSink::new(Box::new(sink), self.queue_capacity, policy)
                        .with_drain_timeout(drain_timeout),
                ))
            }
        }
    }
}

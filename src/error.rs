//! Error taxonomy for the recording pipeline
//!
//! Setup-time errors (`Filesystem`, `ProcessSpawn`, `InvalidConfig`) abort a
//! session before any frame flows. Steady-state errors (`WriteError`, `CaptureError`) are caught
//! by the pipeline, logged once, and never reach the host render loop.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by session setup and teardown
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Directory or file creation failed
    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The encoder process could not be started
    #[error("Failed to start encoder {program:?}: {reason}")]
    ProcessSpawn { program: String, reason: String },

    /// The encoder exited unsuccessfully when closed
    #[error("Encoder exited with {status}")]
    EncoderExit { status: String },

    /// Writing the first-frame still image failed
    #[error("Failed to save snapshot {path:?}: {reason}")]
    Snapshot { path: PathBuf, reason: String },

    /// The frame source rejected its configuration
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Writing to the encoder failed
    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// Operation not valid in the pipeline's current state
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// A setting cannot produce a playable recording
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RecorderError {
    /// Whether this error must abort session setup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Filesystem { .. }
                | Self::ProcessSpawn { .. }
                | Self::InvalidState(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Failure while pushing a frame into the encoder's input stream
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error writing frame: {0}")]
    Io(#[from] io::Error),

    /// The frame does not match the resolution the encoder was spawned with
    #[error("Frame is {actual} bytes, encoder expects {expected}")]
    FrameSize { expected: usize, actual: usize },

    /// The sink was already closed
    #[error("Encoder input is closed")]
    Closed,

    /// The background writer is gone
    #[error("Encoder writer disconnected: {0}")]
    Disconnected(String),
}

/// Failure while rendering or reading back a frame
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Frame source used before configure()")]
    NotConfigured,

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Pixel readback failed: {0}")]
    Readback(String),

    /// Readback produced a buffer of the wrong length
    #[error("Readback returned {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Invalid capture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors_are_fatal() {
        let fs = RecorderError::Filesystem {
            path: PathBuf::from("/nope"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let spawn = RecorderError::ProcessSpawn {
            program: "ffmpeg".to_string(),
            reason: "not found".to_string(),
        };
        assert!(fs.is_fatal());
        assert!(spawn.is_fatal());
        assert!(RecorderError::InvalidConfig("fps is 0".to_string()).is_fatal());

        let write: RecorderError = WriteError::Closed.into();
        assert!(!write.is_fatal());
    }

    #[test]
    fn test_error_messages_name_the_cause() {
        let err = WriteError::FrameSize {
            expected: 16,
            actual: 8,
        };
        assert_eq!(err.to_string(), "Frame is 8 bytes, encoder expects 16");

        let err = RecorderError::ProcessSpawn {
            program: "ffmpeg".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert!(err.to_string().contains("ffmpeg"));
    }
}

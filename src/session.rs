//! Session records: what a recording run is, and what it produced

use chrono::{DateTime, Local};
use std::path::PathBuf;
use uuid::Uuid;

use crate::capture::{frame_len, PixelFormat};

/// Host-supplied inputs for starting a session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Wall-clock start time (names the session directory)
    pub started_at: DateTime<Local>,
    /// World/system clock value (its integer part goes into the file name)
    pub clock_value: f64,
    /// Overrides the camera's own name when set
    pub identifier: Option<String>,
}

impl SessionRequest {
    /// Request a session starting now
    pub fn now(clock_value: f64) -> Self {
        Self {
            started_at: Local::now(),
            clock_value,
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// One recording run. Fixed once the encoder has been spawned.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID (for logs)
    pub id: Uuid,
    /// Source identifier (camera name)
    pub identifier: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second fed to the encoder
    pub fps: u32,
    pub pixel_format: PixelFormat,
    /// Whether the encoder flips frames vertically
    pub vertical_flip: bool,
    /// Directory holding this session's files
    pub directory: PathBuf,
    /// Encoded video destination
    pub video_path: PathBuf,
    /// First-frame still image destination
    pub snapshot_path: PathBuf,
    pub started_at: DateTime<Local>,
}

impl Session {
    /// Bytes in every frame of this session
    pub fn frame_len(&self) -> usize {
        frame_len(self.width, self.height, self.pixel_format)
    }

    /// Resolution as ffmpeg's `WIDTHxHEIGHT`
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// What a session produced, reported at teardown
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub session_id: Option<Uuid>,
    pub video_path: Option<PathBuf>,
    /// Frames returned by the frame source
    pub frames_captured: u64,
    /// Frames accepted by the encoder sink
    pub frames_written: u64,
    /// Frames discarded by the drop backpressure policy
    pub frames_dropped: u64,
    pub capture_failures: u64,
    pub write_failures: u64,
    pub snapshot_path: Option<PathBuf>,
    /// Error from closing the encoder, if any
    pub close_error: Option<String>,
}

impl SessionSummary {
    /// True when every captured frame reached the encoder and it closed cleanly
    pub fn is_clean(&self) -> bool {
        self.capture_failures == 0
            && self.write_failures == 0
            && self.frames_dropped == 0
            && self.close_error.is_none()
    }
}

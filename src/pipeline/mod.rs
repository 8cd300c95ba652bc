//! Capture pipeline bound to the host's per-frame callback
//!
//! Lifecycle:
//! - `on_init` resolves the output location, configures the frame source and
//!   opens the encoder sink
//! - `on_frame` captures exactly one frame and writes it, in that order
//! - `on_teardown` closes the sink and reports a summary
//!
//! Steady-state failures are logged once per kind and counted; they never
//! reach the host render loop.

mod snapshot;

pub use snapshot::save_snapshot;

use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::{FrameSource, PixelFormat};
use crate::encoder::{FrameSink, SinkOpener};
use crate::error::RecorderError;
use crate::output::OutputResolver;
use crate::session::{Session, SessionRequest, SessionSummary};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No session yet
    #[default]
    Uninitialized,
    /// Encoder running, waiting for the first frame
    Ready,
    /// Frames are flowing
    Recording,
    /// Session torn down
    Closed,
    /// Setup failed; no encoder is running
    Failed,
}

/// Host plugin interface
pub trait RenderHook {
    /// Start a session. Fatal setup errors are returned.
    fn on_init(&mut self, request: &SessionRequest) -> Result<Session, RecorderError>;

    /// Called once per rendered frame. Never fails.
    fn on_frame(&mut self);

    /// End the session. Returns `None` if there was nothing to tear down.
    fn on_teardown(&mut self) -> Option<SessionSummary>;
}

/// Session-independent pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub resolver: OutputResolver,
    /// Directory under the resolver root grouping all sessions
    pub base_category: String,
    /// Capture width override (camera's native width when unset)
    pub width: Option<u32>,
    /// Capture height override (camera's native height when unset)
    pub height: Option<u32>,
    pub pixel_format: PixelFormat,
    pub fps: u32,
    /// Flip applied by the encoder (and the snapshot)
    pub vertical_flip: bool,
    /// Save the first frame as a PNG
    pub snapshot: bool,
}

impl PipelineOptions {
    pub fn new(resolver: OutputResolver) -> Self {
        Self {
            resolver,
            base_category: "Simulator_Recordings".to_string(),
            width: None,
            height: None,
            pixel_format: PixelFormat::default(),
            fps: 60,
            vertical_flip: true,
            snapshot: true,
        }
    }
}

/// Which steady-state failures have been logged this session
#[derive(Debug, Default)]
struct LoggedFailures {
    capture: bool,
    write: bool,
    snapshot: bool,
}

/// Everything that exists only while a session is live
struct ActiveSession {
    session: Session,
    sink: Box<dyn FrameSink>,
    next_sequence: u64,
    snapshot_taken: bool,
    logged: LoggedFailures,
    summary: SessionSummary,
}

/// Drives one frame source into one sink, one session at a time
pub struct CapturePipeline<S: FrameSource> {
    options: PipelineOptions,
    source: S,
    opener: Box<dyn SinkOpener>,
    state: PipelineState,
    active: Option<ActiveSession>,
}

impl<S: FrameSource> CapturePipeline<S> {
    pub fn new(options: PipelineOptions, source: S, opener: Box<dyn SinkOpener>) -> Self {
        Self {
            options,
            source,
            opener,
            state: PipelineState::Uninitialized,
            active: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The live session, if any
    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Frames captured so far in the live session
    pub fn frames_captured(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.summary.frames_captured)
    }

    fn start_session(&mut self, request: &SessionRequest) -> Result<ActiveSession, RecorderError> {
        // Checked before anything is created on disk
        if self.options.fps == 0 {
            return Err(RecorderError::InvalidConfig(
                "frame rate must be at least 1 fps".to_string(),
            ));
        }

        let identifier = request
            .identifier
            .clone()
            .unwrap_or_else(|| self.source.identifier().to_string());

        let paths = self.options.resolver.resolve(
            &self.options.base_category,
            &identifier,
            request.started_at,
            request.clock_value,
        )?;

        let (native_width, native_height) = self.source.native_size();
        let width = self.options.width.unwrap_or(native_width);
        let height = self.options.height.unwrap_or(native_height);
        self.source
            .configure(width, height, self.options.pixel_format)?;

        let session = Session {
            id: Uuid::new_v4(),
            identifier,
            width,
            height,
            fps: self.options.fps,
            pixel_format: self.options.pixel_format,
            vertical_flip: self.options.vertical_flip,
            directory: paths.directory,
            video_path: paths.video_path,
            snapshot_path: paths.snapshot_path,
            started_at: request.started_at,
        };

        let sink = self.opener.open(&session)?;

        let summary = SessionSummary {
            session_id: Some(session.id),
            video_path: Some(session.video_path.clone()),
            ..Default::default()
        };

        Ok(ActiveSession {
            session,
            sink,
            next_sequence: 0,
            snapshot_taken: false,
            logged: LoggedFailures::default(),
            summary,
        })
    }
}

impl<S: FrameSource> RenderHook for CapturePipeline<S> {
    fn on_init(&mut self, request: &SessionRequest) -> Result<Session, RecorderError> {
        match self.state {
            PipelineState::Uninitialized | PipelineState::Closed => {}
            state => {
                return Err(RecorderError::InvalidState(format!(
                    "on_init called while {:?}",
                    state
                )));
            }
        }

        match self.start_session(request) {
            Ok(active) => {
                let session = active.session.clone();
                info!(
                    "Session {} ready: {} {}x{} @ {} fps -> {:?}",
                    session.id,
                    session.identifier,
                    session.width,
                    session.height,
                    session.fps,
                    session.video_path
                );
                self.active = Some(active);
                self.state = PipelineState::Ready;
                Ok(session)
            }
            Err(e) => {
                error!("Session setup failed: {}", e);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn on_frame(&mut self) {
        match self.state {
            PipelineState::Ready => {
                self.state = PipelineState::Recording;
                debug!("First frame, recording");
            }
            PipelineState::Recording => {}
            _ => return,
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };

        let mut frame = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                active.summary.capture_failures += 1;
                if !active.logged.capture {
                    warn!("Frame capture failed (further failures not logged): {}", e);
                    active.logged.capture = true;
                }
                return;
            }
        };

        frame.set_sequence(active.next_sequence);
        active.next_sequence += 1;
        active.summary.frames_captured += 1;

        if self.options.snapshot && !active.snapshot_taken {
            // One attempt per session, successful or not
            active.snapshot_taken = true;
            let path = &active.session.snapshot_path;
            match save_snapshot(&frame, path, active.session.vertical_flip) {
                Ok(()) => active.summary.snapshot_path = Some(path.clone()),
                Err(e) => {
                    if !active.logged.snapshot {
                        warn!("{}", e);
                        active.logged.snapshot = true;
                    }
                }
            }
        }

        let sequence = frame.sequence();
        if let Err(e) = active.sink.write_frame(frame) {
            active.summary.write_failures += 1;
            if !active.logged.write {
                warn!(
                    "Writing frame {} to encoder failed (further failures not logged): {}",
                    sequence, e
                );
                active.logged.write = true;
            }
        }
    }

    fn on_teardown(&mut self) -> Option<SessionSummary> {
        self.state = PipelineState::Closed;

        let mut active = self.active.take()?;
        let close_result = active.sink.close();

        let mut summary = active.summary;
        summary.frames_written = active.sink.frames_written();
        summary.frames_dropped = active.sink.frames_dropped();
        if let Err(e) = close_result {
            error!("Encoder close failed: {}", e);
            summary.close_error = Some(e.to_string());
        }

        info!(
            "Session {} closed: {} captured, {} written, {} dropped, {} capture failures, {} write failures",
            active.session.id,
            summary.frames_captured,
            summary.frames_written,
            summary.frames_dropped,
            summary.capture_failures,
            summary.write_failures
        );

        Some(summary)
    }
}

impl<S: FrameSource> Drop for CapturePipeline<S> {
    fn drop(&mut self) {
        if self.active.is_some() {
            debug!("Pipeline dropped with a live session, tearing down");
            self.on_teardown();
        }
    }
}

/// Root directory used when none is configured
pub fn default_output_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

//! Encoder command line construction
//!
//! Builds the fixed ffmpeg argument set for a raw-video-on-stdin session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;

use crate::session::Session;

/// Encoder settings, fixed for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Encoder executable (looked up on PATH)
    #[serde(default = "default_program")]
    pub program: String,

    /// Input frame rate (copied into each session)
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Constant rate factor, the main quality/size knob
    #[serde(default = "default_crf")]
    pub crf: u32,

    /// Encoder speed preset (empty to omit)
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Pixel format of the encoded video
    #[serde(default = "default_output_pixel_format")]
    pub output_pixel_format: String,

    /// Encoder threads (0 = automatic)
    #[serde(default)]
    pub threads: u32,

    /// Flip frames vertically while encoding (copied into each session)
    #[serde(default = "default_true")]
    pub vertical_flip: bool,

    /// ffmpeg `-loglevel`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long to wait for the encoder to finish after end-of-input
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,

    /// Extra arguments inserted before the output path
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_fps() -> u32 {
    60
}

fn default_crf() -> u32 {
    21
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_output_pixel_format() -> String {
    "yuv420p".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_close_timeout_secs() -> u64 {
    10
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            fps: default_fps(),
            crf: default_crf(),
            preset: default_preset(),
            output_pixel_format: default_output_pixel_format(),
            threads: 0,
            vertical_flip: default_true(),
            log_level: default_log_level(),
            close_timeout_secs: default_close_timeout_secs(),
            extra_args: Vec::new(),
        }
    }
}

/// Program plus arguments for the encoder process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    program: String,
    args: Vec<String>,
}

impl EncoderCommand {
    /// Arbitrary command that reads raw frames on stdin
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// ffmpeg command for a session
    pub fn ffmpeg(settings: &EncoderSettings, session: &Session) -> Self {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            settings.log_level.clone(),
            // Input: headerless raw frames on stdin
            "-r".into(),
            session.fps.to_string(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            session.pixel_format.ffmpeg_name().into(),
            "-s".into(),
            session.size_arg(),
            "-i".into(),
            "-".into(),
            // Output
            "-threads".into(),
            settings.threads.to_string(),
        ];

        if !settings.preset.is_empty() {
            args.push("-preset".into());
            args.push(settings.preset.clone());
        }

        args.extend([
            "-y".to_string(),
            "-pix_fmt".to_string(),
            settings.output_pixel_format.clone(),
            "-crf".to_string(),
            settings.crf.to_string(),
        ]);

        if let Some(filters) = filter_chain(settings, session) {
            args.push("-vf".into());
            args.push(filters);
        }

        args.extend(settings.extra_args.iter().cloned());
        args.push(session.video_path.to_string_lossy().into_owned());

        Self {
            program: settings.program.clone(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for EncoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// `-vf` value for a session, if any filter is needed
///
/// 4:2:0 chroma subsampling needs even dimensions, so odd sizes are padded
/// by one pixel.
fn filter_chain(settings: &EncoderSettings, session: &Session) -> Option<String> {
    let (width, height) = (session.width, session.height);
    let mut filters = Vec::new();

    if session.vertical_flip {
        filters.push("vflip".to_string());
    }

    let subsampled = settings.output_pixel_format.contains("420");
    if subsampled && (width % 2 != 0 || height % 2 != 0) {
        filters.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string());
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

//! Configuration management for sim-recorder

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::PixelFormat;
use crate::encoder::{Backpressure, EncoderSettings, FfmpegOpener};
use crate::output::{Layout, OutputResolver};
use crate::pipeline::{default_output_root, PipelineOptions};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where recordings are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Capture resolution and pixel layout
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Encoder process settings
    #[serde(default)]
    pub encoder: EncoderSettings,

    /// Render thread / encoder coupling
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory (current directory when unset)
    pub root: Option<PathBuf>,

    /// Directory under the root grouping all sessions
    #[serde(default = "default_base_category")]
    pub base_category: String,

    /// `session` for timestamped session directories, `flat` for none
    #[serde(default)]
    pub layout: Layout,

    /// Video container extension
    #[serde(default = "default_container")]
    pub container: String,

    /// Save the first frame of each session as a PNG
    #[serde(default = "default_true")]
    pub snapshot: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Width override; the camera's own width when unset
    pub width: Option<u32>,

    /// Height override; the camera's own height when unset
    pub height: Option<u32>,

    /// Readback layout, `rgba` or `bgra`
    #[serde(default)]
    pub pixel_format: PixelFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `block`, `drop` or `buffer`
    #[serde(default)]
    pub backpressure: Backpressure,

    /// Frames held between the render thread and the encoder writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

// Default value functions
fn default_base_category() -> String {
    "Simulator_Recordings".to_string()
}

fn default_container() -> String {
    "mp4".to_string()
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    8
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: None,
            base_category: default_base_category(),
            layout: Layout::default(),
            container: default_container(),
            snapshot: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backpressure: Backpressure::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    ///
    /// A missing file at the default location is created with defaults. A
    /// missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else if path.is_some() {
            anyhow::bail!("Config file not found: {:?}", config_path)
        } else {
            // Create default config
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Save to an explicit path and remember it
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        self.config_path = Some(path.to_path_buf());
        self.save()
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "sim-recorder", "recorder")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Root directory recordings go under
    pub fn output_root(&self) -> PathBuf {
        self.output.root.clone().unwrap_or_else(default_output_root)
    }

    /// Pipeline settings derived from this configuration
    pub fn pipeline_options(&self) -> PipelineOptions {
        let resolver = OutputResolver::new(self.output_root(), self.output.layout)
            .with_container(self.output.container.clone());

        PipelineOptions {
            resolver,
            base_category: self.output.base_category.clone(),
            width: self.capture.width,
            height: self.capture.height,
            pixel_format: self.capture.pixel_format,
            fps: self.encoder.fps,
            vertical_flip: self.encoder.vertical_flip,
            snapshot: self.output.snapshot,
        }
    }

    /// Sink opener for the configured encoder and backpressure policy
    pub fn sink_opener(&self) -> FfmpegOpener {
        FfmpegOpener::new(self.encoder.clone())
            .with_backpressure(self.pipeline.backpressure, self.pipeline.queue_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.output.base_category, "Simulator_Recordings");
        assert_eq!(config.output.layout, Layout::Session);
        assert_eq!(config.encoder.fps, 60);
        assert_eq!(config.encoder.crf, 21);
        assert_eq!(config.pipeline.backpressure, Backpressure::Block);
        assert_eq!(config.pipeline.queue_capacity, 8);
        assert!(config.capture.width.is_none());
    }

    #[test]
    fn test_partial_sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [output]
            root = "/tmp/recs"
            layout = "flat"

            [capture]
            width = 640
            height = 480
            pixel_format = "bgra"

            [pipeline]
            backpressure = "drop"
            "#,
        )
        .unwrap();

        assert_eq!(config.output_root(), PathBuf::from("/tmp/recs"));
        assert_eq!(config.output.layout, Layout::Flat);
        assert_eq!(config.output.container, "mp4");
        assert_eq!(config.capture.pixel_format, PixelFormat::Bgra);
        assert_eq!(config.pipeline.backpressure, Backpressure::Drop);

        let options = config.pipeline_options();
        assert_eq!(options.width, Some(640));
        assert_eq!(options.resolver.layout(), Layout::Flat);
        assert_eq!(options.fps, 60);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.encoder.crf = 18;
        config.pipeline.backpressure = Backpressure::BufferAndWarn;
        config.save_to(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.encoder.crf, 18);
        assert_eq!(loaded.pipeline.backpressure, Backpressure::BufferAndWarn);
        assert_eq!(loaded.config_path().unwrap(), path);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&tmp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_unknown_backpressure_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[pipeline]\nbackpressure = \"sometimes\"");
        assert!(result.is_err());
    }
}

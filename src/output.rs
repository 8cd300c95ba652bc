//! Output location resolution
//!
//! Every session gets its own timestamp-named directory under a base category
//! directory, e.g. `Simulator_Recordings/20240305_140709/main_camera_12.mp4`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::RecorderError;

/// strftime format for session directory names
pub const SESSION_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where recordings are placed relative to the base category directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `<base>/<YYYYMMDD_HHMMSS>/<file>`
    #[default]
    Session,
    /// `<base>/<file>`
    Flat,
}

/// Resolved destination for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub directory: PathBuf,
    pub video_path: PathBuf,
    pub snapshot_path: PathBuf,
}

/// Resolves collision-free output paths for recording sessions
#[derive(Debug, Clone)]
pub struct OutputResolver {
    root: PathBuf,
    layout: Layout,
    container: String,
}

impl OutputResolver {
    pub fn new(root: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            root: root.into(),
            layout,
            container: "mp4".to_string(),
        }
    }

    /// Set the video container extension (without the dot)
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Create the session's directories and derive its file names
    ///
    /// Fails with [`RecorderError::Filesystem`] if either the base or the
    /// session directory cannot be created.
    pub fn resolve(
        &self,
        base_category: &str,
        identifier: &str,
        started_at: DateTime<Local>,
        clock_value: f64,
    ) -> Result<SessionPaths, RecorderError> {
        let base_dir = self.ensure_base_dir(base_category)?;

        let directory = match self.layout {
            Layout::Session => create_session_dir(&base_dir, &started_at)?,
            Layout::Flat => base_dir,
        };

        let name = sanitize_identifier(identifier);
        let stem = format!("{}_{}", name, clock_value as i64);
        let video_path = unique_path(&directory, &stem, &self.container);
        let snapshot_path = directory.join(format!("{}.png", name));

        info!("Session output resolved: {:?}", video_path);

        Ok(SessionPaths {
            directory,
            video_path,
            snapshot_path,
        })
    }

    fn ensure_base_dir(&self, base_category: &str) -> Result<PathBuf, RecorderError> {
        let base_dir = self.root.join(base_category);
        if !base_dir.is_dir() {
            debug!("Creating base directory {:?}", base_dir);
            std::fs::create_dir_all(&base_dir).map_err(|source| RecorderError::Filesystem {
                path: base_dir.clone(),
                source,
            })?;
        }
        Ok(base_dir)
    }
}

/// Directory name for a session started at `started_at`
pub fn session_dir_name(started_at: &DateTime<Local>) -> String {
    started_at.format(SESSION_DIR_FORMAT).to_string()
}

fn create_session_dir(base_dir: &Path, started_at: &DateTime<Local>) -> Result<PathBuf, RecorderError> {
    let dir = base_dir.join(session_dir_name(started_at));
    // Sessions started within the same second share the directory
    std::fs::create_dir_all(&dir).map_err(|source| RecorderError::Filesystem {
        path: dir.clone(),
        source,
    })?;
    debug!("Session directory ready: {:?}", dir);
    Ok(dir)
}

/// Make a camera name safe to use as a file name
pub fn sanitize_identifier(identifier: &str) -> String {
    let cleaned: String = identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "camera".to_string()
    } else {
        cleaned
    }
}

/// `<dir>/<stem>.<ext>`, or `<stem>_N.<ext>` if that already exists
fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, h, m, s).unwrap()
    }

    #[test]
    fn test_session_dir_name_format() {
        assert_eq!(session_dir_name(&at(14, 7, 9)), "20240305_140709");
    }

    #[test]
    fn test_resolve_creates_base_and_session_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path(), Layout::Session);

        let paths = resolver
            .resolve("Simulator_Recordings", "main_camera", at(14, 7, 9), 12.9)
            .unwrap();

        let expected_dir = tmp.path().join("Simulator_Recordings").join("20240305_140709");
        assert!(expected_dir.is_dir());
        assert_eq!(paths.directory, expected_dir);
        assert_eq!(paths.video_path, expected_dir.join("main_camera_12.mp4"));
        assert_eq!(paths.snapshot_path, expected_dir.join("main_camera.png"));
    }

    #[test]
    fn test_same_second_different_identifiers_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path(), Layout::Session);

        let a = resolver.resolve("Recs", "left", at(9, 0, 0), 3.0).unwrap();
        let b = resolver.resolve("Recs", "right", at(9, 0, 0), 3.0).unwrap();

        assert_eq!(a.directory, b.directory);
        assert_ne!(a.video_path, b.video_path);
        assert_ne!(a.snapshot_path, b.snapshot_path);
    }

    #[test]
    fn test_different_timestamps_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path(), Layout::Session);

        let a = resolver.resolve("Recs", "cam", at(9, 0, 0), 0.0).unwrap();
        let b = resolver.resolve("Recs", "cam", at(9, 0, 1), 0.0).unwrap();

        assert_ne!(a.directory, b.directory);
        assert!(a.directory.is_dir());
        assert!(b.directory.is_dir());
    }

    #[test]
    fn test_existing_recording_is_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path(), Layout::Flat);

        let first = resolver.resolve("Recs", "cam", at(9, 0, 0), 5.0).unwrap();
        std::fs::write(&first.video_path, b"earlier run").unwrap();

        let second = resolver.resolve("Recs", "cam", at(9, 0, 0), 5.0).unwrap();
        assert_eq!(first.video_path, tmp.path().join("Recs").join("cam_5.mp4"));
        assert_eq!(second.video_path, tmp.path().join("Recs").join("cam_5_1.mp4"));
    }

    #[test]
    fn test_flat_layout_writes_into_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path(), Layout::Flat).with_container("mkv");

        let paths = resolver.resolve("Objects", "arm cam/1", at(9, 0, 0), 42.0).unwrap();
        assert_eq!(paths.directory, tmp.path().join("Objects"));
        assert_eq!(paths.video_path, tmp.path().join("Objects").join("arm_cam_1_42.mkv"));
    }

    #[test]
    fn test_base_dir_failure_is_filesystem_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();

        let resolver = OutputResolver::new(&blocker, Layout::Session);
        let err = resolver.resolve("Recs", "cam", at(9, 0, 0), 0.0).unwrap_err();
        assert!(matches!(err, RecorderError::Filesystem { .. }));
    }

    #[test]
    fn test_session_dir_failure_is_filesystem_error() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("Recs");
        std::fs::create_dir(&base).unwrap();
        // A file squatting on the session directory name
        std::fs::write(base.join("20240305_090000"), b"").unwrap();

        let resolver = OutputResolver::new(tmp.path(), Layout::Session);
        let err = resolver.resolve("Recs", "cam", at(9, 0, 0), 0.0).unwrap_err();
        match err {
            RecorderError::Filesystem { path, .. } => {
                assert_eq!(path, base.join("20240305_090000"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("main camera"), "main_camera");
        assert_eq!(sanitize_identifier("../etc"), ".._etc");
        assert_eq!(sanitize_identifier("  "), "camera");
        assert_eq!(sanitize_identifier(".."), "camera");
        assert_eq!(sanitize_identifier("cam-1.left"), "cam-1.left");
    }
}

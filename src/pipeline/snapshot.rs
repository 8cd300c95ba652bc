//! First-frame still image

use std::path::Path;
use tracing::info;

use crate::capture::Frame;
use crate::error::RecorderError;

/// Write `frame` as a PNG, flipped to match the encoded video if requested
pub fn save_snapshot(frame: &Frame, path: &Path, flip_vertical: bool) -> Result<(), RecorderError> {
    let image = frame
        .to_rgba_image(flip_vertical)
        .ok_or_else(|| RecorderError::Snapshot {
            path: path.to_path_buf(),
            reason: format!(
                "{} bytes do not form a {}x{} image",
                frame.len(),
                frame.width(),
                frame.height()
            ),
        })?;

    image.save(path).map_err(|e| RecorderError::Snapshot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    info!("Snapshot saved: {:?}", path);
    Ok(())
}

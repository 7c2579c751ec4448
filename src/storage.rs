//! Transient storage for uploaded images

use crate::paths::extension_with_dot;
use chrono::{DateTime, Local};
use log::info;
use std::path::{Path, PathBuf};

/// Extensions the upload control accepts
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Whether `name` carries one of the accepted image extensions
pub fn is_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| e.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Builds `image_<YYYYMMDD_HHMMSS>_<8 hex chars><ext>` for an upload
pub fn unique_filename(original_name: &str, now: DateTime<Local>) -> String {
    let short_id = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "image_{}_{}{}",
        now.format("%Y%m%d_%H%M%S"),
        &short_id[..8],
        extension_with_dot(original_name)
    )
}

/// Directory-backed store; one file per upload
#[derive(Debug, Clone)]
pub struct ImageStorage {
    dir: PathBuf,
}

impl ImageStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the upload under a fresh unique name and returns its path
    pub async fn save(&self, bytes: &[u8], original_name: &str) -> Result<PathBuf, String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("Failed to create images directory: {}", e))?;

        let filepath = self.dir.join(unique_filename(original_name, Local::now()));
        tokio::fs::write(&filepath, bytes)
            .await
            .map_err(|e| format!("Failed to write image: {}", e))?;

        info!("[storage] Saved image to: {}", filepath.display());
        Ok(filepath)
    }

    /// Removes the file if present; a missing file is not an error
    pub async fn delete(&self, path: &Path) -> Result<(), String> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("[storage] Deleted image: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to delete image: {}", e)),
        }
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, String> {
        tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => format!("Image not found: {}", path.display()),
            _ => format!("Failed to read image: {}", e),
        })
    }
}

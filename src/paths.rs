//! Path utilities and file system helpers

use std::path::{Path, PathBuf};

/// Default directory (relative to the working directory) for uploaded images
pub const DEFAULT_IMAGES_DIR: &str = "images";

/// File name offered when the analysis report is downloaded
pub const REPORT_FILE_NAME: &str = "analysis_report.txt";

/// Environment files checked at startup, first match wins
pub const ENV_FILE_CANDIDATES: [&str; 2] = ["myenv/.env", ".env"];

/// Gets the application config directory
pub fn get_app_config_dir() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|p| p.join("vision-prompt"))
        .ok_or_else(|| "Could not find config directory".to_string())
}

/// Gets the settings file path
pub fn get_config_path() -> Result<PathBuf, String> {
    get_app_config_dir().map(|p| p.join("config.json"))
}

/// Returns the first existing environment file, if any
pub fn find_env_file() -> Option<PathBuf> {
    ENV_FILE_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Extension of `name` including the leading dot, or an empty string
pub fn extension_with_dot(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

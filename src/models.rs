//! Data models and structures used throughout the application

use crate::prompts::{REPORT_RULE, REPORT_TITLE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a session is in the upload → process cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    #[default]
    NoImage,
    ImageUploaded,
    Processing,
    Completed,
    Error,
}

/// Per-session context handed to every flow operation
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub current_image_path: Option<PathBuf>,
    pub encoded_image: Option<String>,
    pub original_name: Option<String>,
    pub last_report: Option<String>,
    pub phase: FlowPhase,
}

impl SessionState {
    /// Drops image-related fields; the file itself must already be gone
    pub fn clear_image(&mut self) {
        self.current_image_path = None;
        self.encoded_image = None;
        self.original_name = None;
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            phase: self.phase,
            has_image: self.encoded_image.is_some(),
            image_name: self.original_name.clone(),
            has_report: self.last_report.is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub file_path: String,
    pub prompt: String,
    pub response: String,
}

impl Report {
    pub fn render(&self) -> String {
        format!(
            "{}\n{}\nImage Details:\n- File path: {}\n\nUser Prompt:\n{}\n\nAI Response:\n{}\n",
            REPORT_TITLE, REPORT_RULE, self.file_path, self.prompt, self.response
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub path: String,
    pub encoded_len: usize,
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub response: String,
    pub report: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusResponse {
    pub phase: FlowPhase,
    pub has_image: bool,
    pub image_name: Option<String>,
    pub has_report: bool,
}

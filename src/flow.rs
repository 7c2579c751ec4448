//! Upload → encode → prompt → query → report → cleanup

use crate::encoder::encode;
use crate::models::{FlowPhase, ProcessResponse, Report, SessionState, UploadResponse};
use crate::prompts::{MISSING_IMAGE_MESSAGE, MISSING_PROMPT_MESSAGE};
use crate::storage::{is_allowed_extension, ImageStorage, ALLOWED_EXTENSIONS};
use crate::vision::VisionClient;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("Error processing image: {0}")]
    Upload(String),
    #[error("{0}")]
    Validation(&'static str),
    #[error("Error during processing: {0}")]
    Remote(String),
}

/// Best-effort width/height lookup; unreadable images are still accepted
fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[derive(Clone)]
pub struct ImageFlow {
    storage: ImageStorage,
    client: Arc<dyn VisionClient>,
}

impl ImageFlow {
    pub fn new(storage: ImageStorage, client: Arc<dyn VisionClient>) -> Self {
        Self { storage, client }
    }

    pub fn storage(&self) -> &ImageStorage {
        &self.storage
    }

    /// Stores and encodes an upload, replacing any image already tracked.
    ///
    /// On failure every file this session tracks is removed and the session
    /// returns to `NoImage`.
    pub async fn upload(
        &self,
        state: &mut SessionState,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<UploadResponse, FlowError> {
        match self.store_upload(state, bytes, original_name).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!("[upload] {}", e);
                self.discard_image(state).await;
                state.phase = FlowPhase::NoImage;
                Err(FlowError::Upload(e))
            }
        }
    }

    async fn store_upload(
        &self,
        state: &mut SessionState,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<UploadResponse, String> {
        if !is_allowed_extension(original_name) {
            return Err(format!(
                "unsupported file type '{}' (expected one of: {})",
                original_name,
                ALLOWED_EXTENSIONS.join(", ")
            ));
        }
        if bytes.is_empty() {
            return Err("uploaded file is empty".to_string());
        }

        // At most one tracked file per session
        self.discard_image(state).await;

        let filepath = self.storage.save(bytes, original_name).await?;
        state.current_image_path = Some(filepath.clone());
        state.original_name = Some(original_name.to_string());

        let stored = self.storage.read(&filepath).await?;
        let encoded = encode(&stored);
        let dimensions = read_dimensions(&stored);
        info!(
            "[upload] Encoded image length: {} (dimensions: {:?})",
            encoded.len(),
            dimensions
        );

        let response = UploadResponse {
            path: filepath.display().to_string(),
            encoded_len: encoded.len(),
            dimensions,
        };
        state.encoded_image = Some(encoded);
        state.phase = FlowPhase::ImageUploaded;
        Ok(response)
    }

    /// Checks that `process` has an image and a non-blank prompt to work with
    pub fn validate<'a>(state: &'a SessionState, prompt: &str) -> Result<&'a str, FlowError> {
        let encoded = state
            .encoded_image
            .as_deref()
            .ok_or(FlowError::Validation(MISSING_IMAGE_MESSAGE))?;
        if prompt.trim().is_empty() {
            return Err(FlowError::Validation(MISSING_PROMPT_MESSAGE));
        }
        Ok(encoded)
    }

    /// Runs the prompt against the tracked image and returns the reply with its report.
    ///
    /// Validation failures leave the session untouched. A remote failure keeps
    /// the image tracked so the same upload can be retried.
    pub async fn process(
        &self,
        state: &mut SessionState,
        prompt: &str,
    ) -> Result<ProcessResponse, FlowError> {
        let encoded = Self::validate(state, prompt)?.to_string();

        state.phase = FlowPhase::Processing;
        info!("[process] Querying vision model ({} chars of prompt)", prompt.len());

        let content = match self.client.query(&encoded, prompt).await {
            Ok(content) => content,
            Err(e) => {
                error!("[process] Vision query failed: {}", e);
                state.phase = FlowPhase::Error;
                return Err(FlowError::Remote(e));
            }
        };

        let report = Report {
            file_path: state
                .current_image_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            prompt: prompt.to_string(),
            response: content,
        };
        let rendered = report.render();

        self.discard_image(state).await;
        state.last_report = Some(rendered.clone());
        state.phase = FlowPhase::Completed;
        Ok(ProcessResponse {
            response: report.response,
            report: rendered,
        })
    }

    /// Forgets the tracked image and deletes its file
    pub async fn reset(&self, state: &mut SessionState) {
        self.discard_image(state).await;
        state.phase = FlowPhase::NoImage;
    }

    async fn discard_image(&self, state: &mut SessionState) {
        if let Some(path) = state.current_image_path.as_ref() {
            if let Err(e) = self.storage.delete(path).await {
                warn!("[cleanup] {}", e);
            }
        }
        state.clear_image();
    }
}

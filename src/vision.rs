//! Remote vision model client (OpenAI-compatible chat completions)

use crate::config::AppConfig;
use crate::encoder::data_url;
use async_trait::async_trait;
use log::{error, info};
use serde_json::{json, Value};
use std::time::Duration;

/// Images are always labelled JPEG, whatever was uploaded
pub const IMAGE_MIME: &str = "image/jpeg";

/// Anything that can answer a prompt about a base64-encoded image
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn query(&self, base64_image: &str, prompt: &str) -> Result<String, String>;
}

/// Builds the single-turn multimodal message list
pub fn build_messages(base64_image: &str, prompt: &str) -> Vec<Value> {
    vec![json!({
        "role": "user",
        "content": [
            {
                "type": "text",
                "text": prompt
            },
            {
                "type": "image_url",
                "image_url": {
                    "url": data_url(IMAGE_MIME, base64_image)
                }
            }
        ]
    })]
}

/// Pulls the reply text out of a chat-completions response.
///
/// `content` is usually a string; some providers return a list of parts,
/// in which case the text parts are joined with newlines.
pub fn extract_content(response_json: &Value) -> Option<String> {
    let content = &response_json["choices"][0]["message"]["content"];
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    _ => part.get("text").and_then(|t| t.as_str()),
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

pub struct HttpVisionClient {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    referer: Option<String>,
    title: Option<String>,
}

impl HttpVisionClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_chat(&self, messages: Vec<Value>) -> Result<reqwest::Response, String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "Vision API key not configured".to_string())?;

        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            request = request.header("X-Title", title);
        }

        request
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("API request failed: {}", e))
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn query(&self, base64_image: &str, prompt: &str) -> Result<String, String> {
        info!(
            "[vision] Sending {} chars of image data to {}",
            base64_image.len(),
            self.model
        );

        let response = self.call_chat(build_messages(base64_image, prompt)).await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("[vision] API error: {} - {}", status, error_text);
            return Err(format!("API error ({}): {}", status, error_text));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        let content = extract_content(&response_json)
            .ok_or_else(|| "No content in model response".to_string())?;
        info!("[vision] Response received: {} chars", content.len());
        Ok(content)
    }
}

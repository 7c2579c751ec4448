//! Application settings: config file, then environment overrides

use crate::paths::{get_config_path, DEFAULT_IMAGES_DIR};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AppConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Idle sessions older than this are dropped and their images deleted; 0 keeps them forever
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    // OpenRouter attribution, sent only when set
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

fn default_api_base() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.2-11b-vision-preview".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_images_dir() -> String {
    DEFAULT_IMAGES_DIR.to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8501".to_string()
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            images_dir: default_images_dir(),
            bind_addr: default_bind_addr(),
            session_ttl_secs: default_session_ttl_secs(),
            referer: None,
            title: None,
        }
    }
}

impl AppConfig {
    /// Overlays `VISION_*` / `GROQ_API_KEY` values from `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("VISION_API_KEY").or_else(|| non_empty("GROQ_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(base) = non_empty("VISION_API_BASE") {
            self.api_base = base;
        }
        if let Some(model) = non_empty("VISION_MODEL") {
            self.model = model;
        }
        if let Some(dir) = non_empty("VISION_IMAGES_DIR") {
            self.images_dir = dir;
        }
        if let Some(addr) = non_empty("VISION_BIND_ADDR") {
            self.bind_addr = addr;
        }
        match non_empty("VISION_SESSION_TTL_SECS").map(|v| v.trim().parse::<u64>()) {
            Some(Ok(secs)) => self.session_ttl_secs = secs,
            Some(Err(e)) => warn!("[config] Ignoring VISION_SESSION_TTL_SECS: {}", e),
            None => {}
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, String> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
    } else {
        Ok(AppConfig::default())
    }
}

/// Loads the settings file (if any) and applies process environment overrides
pub fn load_config() -> Result<AppConfig, String> {
    let mut config = match get_config_path() {
        Ok(path) => {
            info!("[config] Reading settings from {}", path.display());
            load_config_from(&path)?
        }
        Err(_) => AppConfig::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

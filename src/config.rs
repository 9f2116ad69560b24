//! Service configuration.
//!
//! Values come from a JSON file named by `MENU_INGEST_CONFIG` when set,
//! otherwise from environment variables (a `.env` file is loaded first by
//! `main`). Missing optional values fall back to the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Vision service endpoint receiving the multipart upload.
    pub vision_url: String,
    /// Chat completions endpoint.
    #[serde(default = "default_completion_url")]
    pub completion_url: String,
    pub completion_api_key: String,
    #[serde(default = "default_model")]
    pub completion_model: String,
    /// Ask the completion endpoint for a JSON object response.
    #[serde(default)]
    pub json_mode: bool,
    #[serde(default = "default_vision_timeout")]
    pub vision_timeout_secs: u64,
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_completion_url() -> String {
    DEFAULT_COMPLETION_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_vision_timeout() -> u64 {
    60
}

fn default_completion_timeout() -> u64 {
    120
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_upload_mb() -> usize {
    20
}

impl AnalyzerConfig {
    /// Load from `MENU_INGEST_CONFIG` if set, else from the environment.
    pub fn load() -> Result<Self> {
        match env::var("MENU_INGEST_CONFIG") {
            Ok(path) => Self::load_from_file(Path::new(&path)),
            Err(_) => Self::from_env(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let vision_url = env::var("MENU_ANALYZER_URL")
            .context("MENU_ANALYZER_URL environment variable not set")?;
        let completion_api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let config = Self {
            vision_url,
            completion_url: env::var("COMPLETION_URL").unwrap_or_else(|_| default_completion_url()),
            completion_api_key,
            completion_model: env::var("COMPLETION_MODEL").unwrap_or_else(|_| default_model()),
            json_mode: env_parse("COMPLETION_JSON_MODE")?.unwrap_or(false),
            vision_timeout_secs: env_parse("VISION_TIMEOUT_SECS")?
                .unwrap_or_else(default_vision_timeout),
            completion_timeout_secs: env_parse("COMPLETION_TIMEOUT_SECS")?
                .unwrap_or_else(default_completion_timeout),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| default_bind_addr()),
            max_upload_mb: env_parse("MAX_UPLOAD_MB")?.unwrap_or_else(default_max_upload_mb),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.vision_url.is_empty() {
            anyhow::bail!("vision_url must not be empty");
        }
        if self.vision_timeout_secs == 0 {
            anyhow::bail!("vision_timeout_secs must be greater than zero");
        }
        if self.completion_timeout_secs == 0 {
            anyhow::bail!("completion_timeout_secs must be greater than zero");
        }
        if self.max_upload_mb == 0 || self.max_upload_mb.checked_mul(MIB).is_none() {
            anyhow::bail!("max_upload_mb out of range: {}", self.max_upload_mb);
        }
        Ok(())
    }

    /// Request body limit in bytes. Saturates for configs that skipped validation.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(MIB)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision_timeout_secs)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

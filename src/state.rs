use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::types::TtlPolicy;
use crate::cache::CacheHandle;
use crate::relay::Relay;

/// Which transport answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Remote,
    Local,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Mode::Remote),
            "local" => Ok(Mode::Local),
            other => Err(anyhow::anyhow!(
                "unknown mode '{}', expected 'remote' or 'local'",
                other
            )),
        }
    }
}

/// Injected, read-only configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: Mode,
    pub remote_api_url: String,
    /// Empty means not configured.
    pub remote_api_key: String,
    pub local_server_url: String,
    pub model: String,
    pub data_dir: PathBuf,
    pub ttl: TtlPolicy,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Remote,
            remote_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            remote_api_key: String::new(),
            local_server_url: "http://localhost:5000/generate".to_string(),
            model: "gpt-4o-mini".to_string(),
            data_dir: PathBuf::from("./data/cache"),
            ttl: TtlPolicy::default(),
            http_timeout_secs: 60,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build settings from any key lookup; unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |key: &str| -> Result<Option<i64>> {
            let Some(raw) = get(key) else {
                return Ok(None);
            };
            let value = raw
                .parse::<i64>()
                .with_context(|| format!("{} must be a number of seconds", key))?;
            if value <= 0 {
                anyhow::bail!("{} must be a positive number of seconds, got {}", key, value);
            }
            Ok(Some(value))
        };
        let duration = |key: &str| -> Result<Option<chrono::Duration>> {
            secs(key)?
                .map(|v| {
                    chrono::Duration::try_seconds(v)
                        .with_context(|| format!("{} is out of range: {}", key, v))
                })
                .transpose()
        };

        let mut settings = Self::default();
        if let Some(mode) = get("MCQ_MODE") {
            settings.mode = mode.parse().context("Invalid MCQ_MODE")?;
        }
        if let Some(url) = get("MCQ_REMOTE_API_URL") {
            settings.remote_api_url = url;
        }
        if let Some(key) = get("MCQ_REMOTE_API_KEY") {
            settings.remote_api_key = key;
        }
        if let Some(url) = get("MCQ_LOCAL_SERVER_URL") {
            settings.local_server_url = url;
        }
        if let Some(model) = get("MCQ_MODEL") {
            settings.model = model;
        }
        if let Some(dir) = get("MCQ_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = duration("MCQ_CACHE_TTL_SECS")? {
            settings.ttl.ttl = ttl;
        }
        if let Some(ttl) = duration("MCQ_ERROR_TTL_SECS")? {
            settings.ttl.error_ttl = ttl;
        }
        if let Some(timeout) = secs("MCQ_HTTP_TIMEOUT_SECS")? {
            settings.http_timeout_secs = timeout as u64;
        }
        Ok(settings)
    }

    pub fn has_api_key(&self) -> bool {
        !self.remote_api_key.is_empty()
    }
}

pub struct AppState {
    pub settings: Settings,
    pub cache: CacheHandle,
    pub relay: Arc<Relay>,
}

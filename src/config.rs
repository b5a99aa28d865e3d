//! Process-wide GrsAI settings, loaded once and shared read-only.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.grsai.com";
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://grsai.dakka.com.cn";

const API_KEY_HINT: &str =
    "set GRSAI_KEY in the .env file next to the executable, e.g. GRSAI_KEY=sk-...";

/// Validated API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(Error::Auth(format!("GRSAI_KEY is empty; {}", API_KEY_HINT)));
        }
        if !key.starts_with("sk-") || key.chars().any(char::is_whitespace) {
            return Err(Error::Auth(format!("GRSAI_KEY is malformed; {}", API_KEY_HINT)));
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    api_key: Option<String>,
    pub api_base_url: String,
    pub upload_base_url: String,
    /// Per HTTP request.
    pub request_timeout: Duration,
    /// Total attempts for a transient failure, including the first one.
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(2000),
            job_timeout: Duration::from_secs(600),
            max_concurrency: 4,
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings from an explicit env file. Process environment
    /// variables take precedence over the file.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let mut file_vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (name, value) = item?;
            file_vars.insert(name, value);
        }

        Self::from_lookup(|name| {
            std::env::var(name)
                .ok()
                .or_else(|| file_vars.get(name).cloned())
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("GRSAI_KEY").filter(|key| !key.trim().is_empty());

        Ok(Self {
            api_key,
            api_base_url: lookup("GRSAI_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            upload_base_url: lookup("GRSAI_UPLOAD_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upload_base_url),
            request_timeout: parse_var(&lookup, "GRSAI_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_retries: parse_var(&lookup, "GRSAI_MAX_RETRIES")?
                .map(|n: u64| n.max(1) as usize)
                .unwrap_or(defaults.max_retries),
            retry_base_delay: parse_var(&lookup, "GRSAI_RETRY_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            poll_interval: parse_var(&lookup, "GRSAI_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            job_timeout: parse_var(&lookup, "GRSAI_JOB_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            max_concurrency: parse_var(&lookup, "GRSAI_MAX_CONCURRENCY")?
                .map(|n: u64| n.max(1) as usize)
                .unwrap_or(defaults.max_concurrency),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_urls(mut self, api_base_url: String, upload_base_url: String) -> Self {
        self.api_base_url = api_base_url;
        self.upload_base_url = upload_base_url;
        self
    }

    /// The configured key, or `Error::Auth` when it is missing or malformed.
    pub fn api_key(&self) -> Result<ApiKey> {
        match &self.api_key {
            Some(raw) => ApiKey::parse(raw),
            None => Err(Error::Auth(format!("GRSAI_KEY is not set; {}", API_KEY_HINT))),
        }
    }
}

fn parse_var<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a whole number, got '{}'", name, value))),
        None => Ok(None),
    }
}

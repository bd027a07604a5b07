//! Runtime configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by `main`)
//! 2. Environment variables (e.g. `GEMINI_API_KEY`, `REPORT_MAX_CONCURRENT_WEEKS`)
//! 3. Values from the optional TOML file (`--config`)
//! 4. Built-in defaults

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use batching::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::dispatcher::DEFAULT_MAX_CONCURRENT_WEEKS;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_WAIT_MS: u64 = 1_000;

const ENV_PROVIDER: &str = "REPORT_PROVIDER";
const ENV_BASE_URL: &str = "REPORT_BASE_URL";
const ENV_MODEL: &str = "REPORT_MODEL";
const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
const ENV_API_KEY: &str = "REPORT_API_KEY";
const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
const ENV_REQUEST_TIMEOUT_SECS: &str = "REPORT_REQUEST_TIMEOUT_SECS";
const ENV_MAX_CONCURRENT_WEEKS: &str = "REPORT_MAX_CONCURRENT_WEEKS";
const ENV_UTC_OFFSET_MINUTES: &str = "REPORT_UTC_OFFSET_MINUTES";
const ENV_TELEMETRY_PATH: &str = "REPORT_TELEMETRY_PATH";

/// Which classification service API to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent`.
    Gemini,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    OpenAi,
}

impl Provider {
    fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_BASE_URL,
            Self::OpenAi => DEFAULT_OPENAI_BASE_URL,
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown provider '{other}' (expected gemini or openai)")),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Per-week retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// Wait between attempts. With `exponential`, the first wait.
    pub wait_ms: u64,
    pub exponential: bool,
    /// Cap for exponential waits.
    pub max_wait_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_ms: DEFAULT_RETRY_WAIT_MS,
            exponential: false,
            max_wait_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let backoff = if self.exponential {
            Backoff::Exponential {
                base: Duration::from_millis(self.wait_ms),
                cap: Duration::from_millis(self.max_wait_ms.max(self.wait_ms)),
            }
        } else {
            Backoff::fixed_millis(self.wait_ms)
        };
        RetryPolicy::new(self.max_attempts, backoff)
    }
}

/// Top-level configuration for a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub provider: Provider,
    /// Overrides the provider's default API base URL.
    pub base_url: Option<String>,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    /// Upper bound on weeks classified at the same time.
    pub max_concurrent_weeks: usize,
    /// Offset applied to message instants before computing calendar dates.
    pub utc_offset_minutes: i32,
    /// Append one JSON line of run telemetry here when set.
    pub telemetry_path: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: RetrySettings::default(),
            max_concurrent_weeks: DEFAULT_MAX_CONCURRENT_WEEKS,
            utc_offset_minutes: 0,
            telemetry_path: None,
        }
    }
}

impl ReportConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Optional TOML file overlaid with environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Some(provider) = env_parse::<Provider>(ENV_PROVIDER) {
            self.provider = provider;
        }
        if let Ok(url) = env::var(ENV_BASE_URL) {
            self.base_url = Some(url);
        }
        if let Ok(model) = env::var(ENV_MODEL).or_else(|_| env::var(ENV_GEMINI_MODEL)) {
            self.model = model;
        }
        if let Ok(key) = env::var(ENV_API_KEY).or_else(|_| env::var(ENV_GEMINI_API_KEY)) {
            self.api_key = Some(key);
        }
        if let Some(secs) = env_parse(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = secs;
        }
        if let Some(n) = env_parse(ENV_MAX_CONCURRENT_WEEKS) {
            self.max_concurrent_weeks = n;
        }
        if let Some(minutes) = env_parse(ENV_UTC_OFFSET_MINUTES) {
            self.utc_offset_minutes = minutes;
        }
        if let Ok(path) = env::var(ENV_TELEMETRY_PATH) {
            self.telemetry_path = Some(PathBuf::from(path));
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate everything a live run needs; return an error string if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_offline()?;
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(format!(
                    "API key missing: set {ENV_API_KEY} or {ENV_GEMINI_API_KEY}"
                ))
            }
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Checks that do not involve the classification service.
    pub fn validate_offline(&self) -> Result<(), String> {
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".to_string());
        }
        if self.max_concurrent_weeks == 0 {
            return Err("max_concurrent_weeks must be > 0".to_string());
        }
        // Real-world offsets span UTC-12:00 to UTC+14:00.
        if !(-12 * 60..=14 * 60).contains(&self.utc_offset_minutes) {
            return Err(format!(
                "utc_offset_minutes must be within [-720, 840], got {}",
                self.utc_offset_minutes
            ));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok().filter(|v| !v.trim().is_empty())?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}

//! Orchestrator configuration.
//!
//! Every timing constant is injectable. Values come from a TOML file and are
//! then overridden by `JOBFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{JobflowError, Result};
use crate::job::JobKind;
use crate::progress::ProgressSchedule;

const DEFAULT_PRODUCTION_URL: &str = "https://api.jobflow.app";
const DEFAULT_DEVELOPMENT_URL: &str = "http://localhost:8000";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Backend routing switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(JobflowError::config(format!("unknown environment '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub production_url: String,
    pub development_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            production_url: DEFAULT_PRODUCTION_URL.to_string(),
            development_url: DEFAULT_DEVELOPMENT_URL.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Subtracted from the token lifetime to avoid racing expiry.
    pub token_margin_secs: u64,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_margin_secs: 30,
            client_id: None,
            client_secret: None,
        }
    }
}

// Keep the secret out of debug output.
impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("token_margin_secs", &self.token_margin_secs)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl CredentialConfig {
    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }
}

/// Submission retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            attempt_timeout_secs: 60,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Linear backoff: the wait after failed attempt `n` is `n * base_delay`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_delay().saturating_mul(attempt)
    }
}

/// Interval, attempt budget and progress table of one polling flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingProfile {
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub schedule: ProgressSchedule,
}

impl PollingProfile {
    /// 5 s × 180 attempts, roughly 15 minutes.
    pub fn standard(schedule: ProgressSchedule) -> Self {
        Self {
            interval_secs: 5,
            max_attempts: 180,
            schedule,
        }
    }

    /// 10 s × 120 attempts, roughly 20 minutes.
    pub fn extraction() -> Self {
        Self {
            interval_secs: 10,
            max_attempts: 120,
            schedule: ProgressSchedule::avatar_extraction(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Worst-case wall-clock span of the attempt budget.
    pub fn budget(&self) -> Duration {
        self.interval().saturating_mul(self.max_attempts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub content_generation: PollingProfile,
    pub deep_research: PollingProfile,
    pub avatar_extraction: PollingProfile,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            content_generation: PollingProfile::standard(ProgressSchedule::content_generation()),
            deep_research: PollingProfile::standard(ProgressSchedule::deep_research()),
            avatar_extraction: PollingProfile::extraction(),
        }
    }
}

impl PollingConfig {
    pub fn profile_for(&self, kind: JobKind) -> &PollingProfile {
        match kind {
            JobKind::ContentGeneration => &self.content_generation,
            JobKind::DeepResearch => &self.deep_research,
            JobKind::AvatarExtraction => &self.avatar_extraction,
        }
    }

    fn profiles_mut(&mut self) -> [&mut PollingProfile; 3] {
        [
            &mut self.content_generation,
            &mut self.deep_research,
            &mut self.avatar_extraction,
        ]
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobflowConfig {
    pub environment: Environment,
    pub endpoints: EndpointConfig,
    pub credentials: CredentialConfig,
    pub retry: RetryPolicy,
    pub polling: PollingConfig,
}

impl JobflowConfig {
    /// Base URL of the backend for the selected environment.
    pub fn api_base_url(&self) -> &str {
        match self.environment {
            Environment::Production => &self.endpoints.production_url,
            Environment::Development => &self.endpoints.development_url,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            JobflowError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// `JOBFLOW_CONFIG`, else `<config dir>/jobflow/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        env::var_os("JOBFLOW_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("jobflow").join(CONFIG_FILE_NAME)))
    }

    /// Loads the config file when present, then applies environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("[Config] Loading {}", path.display());
                Self::load(&path)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `JOBFLOW_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("JOBFLOW_ENV") {
            self.environment = Environment::parse(&value)?;
        }
        if let Some(url) = lookup("JOBFLOW_API_URL") {
            match self.environment {
                Environment::Production => self.endpoints.production_url = url,
                Environment::Development => self.endpoints.development_url = url,
            }
        }
        if let Some(id) = lookup("JOBFLOW_CLIENT_ID") {
            self.credentials.client_id = Some(id);
        }
        if let Some(secret) = lookup("JOBFLOW_CLIENT_SECRET") {
            self.credentials.client_secret = Some(secret);
        }
        if let Some(secs) = parse_number(&lookup, "JOBFLOW_POLL_INTERVAL_SECS")? {
            for profile in self.polling.profiles_mut() {
                profile.interval_secs = secs;
            }
        }
        if let Some(attempts) = parse_number::<u32>(&lookup, "JOBFLOW_POLL_MAX_ATTEMPTS")? {
            for profile in self.polling.profiles_mut() {
                profile.max_attempts = attempts;
            }
        }
        if let Some(attempts) = parse_number::<u32>(&lookup, "JOBFLOW_RETRY_MAX_ATTEMPTS")? {
            self.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_number(&lookup, "JOBFLOW_RETRY_BASE_DELAY_MS")? {
            self.retry.base_delay_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(JobflowError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.attempt_timeout_secs == 0 {
            return Err(JobflowError::config(
                "retry.attempt_timeout_secs must be at least 1",
            ));
        }
        for (name, profile) in [
            ("content_generation", &self.polling.content_generation),
            ("deep_research", &self.polling.deep_research),
            ("avatar_extraction", &self.polling.avatar_extraction),
        ] {
            if profile.max_attempts == 0 || profile.interval_secs == 0 {
                return Err(JobflowError::config(format!(
                    "polling.{name} needs a non-zero interval and attempt budget"
                )));
            }
        }
        if self.api_base_url().trim().is_empty() {
            return Err(JobflowError::config("API base URL must not be empty"));
        }
        Ok(())
    }
}

/// Parses into the field's own width so out-of-range values are rejected.
fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| JobflowError::config(format!("{key}: {e}")))
        })
        .transpose()
}

//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::pipe::correlation::CorrelationLimits;
use crate::pipe::protocol::ProtocolVersion;
use crate::{AppError, Result};

/// Keyring service name holding the Slack tokens.
pub const KEYRING_SERVICE: &str = "watershed-relay";

/// Slack connectivity settings.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Channel receiving operator notices (startup, worker exit).
    pub operator_channel_id: String,
    /// Also ping the operator channel for every location request.
    #[serde(default)]
    pub notify_on_request: bool,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Worker process launch and protocol settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker executable.
    pub program: PathBuf,
    /// Watershed dataset handed to the worker; canonicalized on load.
    pub database_path: PathBuf,
    /// Output format selector, passed as `--<output_format>`.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Extra arguments appended after the standard ones.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Lines per response group.
    #[serde(default = "default_line_group_size")]
    pub line_group_size: usize,
    /// Wire protocol spoken with the worker.
    #[serde(default)]
    pub protocol: ProtocolVersion,
    /// Capacity of the queue feeding the stdin writer.
    #[serde(default = "default_request_queue")]
    pub request_queue: usize,
}

impl WorkerConfig {
    /// Validated line group size.
    #[must_use]
    pub fn group_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.line_group_size).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Bounds on the coordinate-derived correlation table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CorrelationConfig {
    /// Seconds before an unanswered request is dropped; 0 disables expiry.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Maximum pending requests.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl CorrelationConfig {
    /// Limits for [`CorrelationStore`](crate::pipe::CorrelationStore).
    #[must_use]
    pub fn limits(&self) -> CorrelationLimits {
        let defaults = CorrelationLimits::default();
        CorrelationLimits {
            ttl: (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds)),
            max_entries: NonZeroUsize::new(self.max_entries).unwrap_or(defaults.max_entries),
        }
    }

    /// Interval between expiry sweeps.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

fn default_output_format() -> String {
    "json".into()
}

fn default_line_group_size() -> usize {
    1
}

fn default_request_queue() -> usize {
    64
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    10_000
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Worker process settings.
    pub worker: WorkerConfig,
    /// Slack connectivity settings.
    pub slack: SlackConfig,
    /// Correlation table bounds.
    #[serde(default)]
    pub correlation: CorrelationConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback.
    ///
    /// Tries the [`KEYRING_SERVICE`] keyring service first, then falls back
    /// to `SLACK_APP_TOKEN` / `SLACK_BOT_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker.program.as_os_str().is_empty() {
            return Err(AppError::Config("worker.program must not be empty".into()));
        }

        if self.worker.line_group_size == 0 {
            return Err(AppError::Config(
                "worker.line_group_size must be greater than zero".into(),
            ));
        }

        if self.worker.request_queue == 0 {
            return Err(AppError::Config(
                "worker.request_queue must be greater than zero".into(),
            ));
        }

        if self.slack.operator_channel_id.is_empty() {
            return Err(AppError::Config(
                "slack.operator_channel_id must not be empty".into(),
            ));
        }

        if self.correlation.max_entries == 0 {
            return Err(AppError::Config(
                "correlation.max_entries must be greater than zero".into(),
            ));
        }

        if self.correlation.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "correlation.sweep_interval_seconds must be greater than zero".into(),
            ));
        }

        let canonical_db = self
            .worker
            .database_path
            .canonicalize()
            .map_err(|err| AppError::Config(format!("worker.database_path invalid: {err}")))?;
        self.worker.database_path = canonical_db;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}

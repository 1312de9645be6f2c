use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::api::ApiClient;
use crate::models::generation::EntityKind;
use crate::poller::{PollConfig, CRITIQUE_TIMEOUT, DEFAULT_INTERVAL, RESUME_TIMEOUT};

/// Client configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub resume_poll_timeout: Duration,
    pub critique_poll_timeout: Duration,
    pub poll_max_failures: Option<u32>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require_env = |key: &str| {
            optional(key)
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let poll_interval_ms = parse_or(
            optional("POLL_INTERVAL_MS"),
            "POLL_INTERVAL_MS",
            DEFAULT_INTERVAL.as_millis() as u64,
        )?;
        if poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than zero");
        }

        Ok(Config {
            api_base_url: require_env("API_BASE_URL")?,
            api_token: optional("API_TOKEN"),
            request_timeout: Duration::from_secs(parse_or(
                optional("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                30,
            )?),
            poll_interval: Duration::from_millis(poll_interval_ms),
            resume_poll_timeout: Duration::from_secs(parse_or(
                optional("RESUME_POLL_TIMEOUT_SECS"),
                "RESUME_POLL_TIMEOUT_SECS",
                RESUME_TIMEOUT.as_secs(),
            )?),
            critique_poll_timeout: Duration::from_secs(parse_or(
                optional("CRITIQUE_POLL_TIMEOUT_SECS"),
                "CRITIQUE_POLL_TIMEOUT_SECS",
                CRITIQUE_TIMEOUT.as_secs(),
            )?),
            poll_max_failures: optional("POLL_MAX_FAILURES")
                .map(|v| {
                    v.parse::<u32>()
                        .context("POLL_MAX_FAILURES must be a positive integer")
                })
                .transpose()?
                .filter(|max| *max > 0),
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn poll_config(&self, kind: EntityKind) -> PollConfig {
        let timeout = match kind {
            EntityKind::Resume => self.resume_poll_timeout,
            EntityKind::Critique => self.critique_poll_timeout,
        };
        PollConfig {
            interval: self.poll_interval,
            timeout,
            max_consecutive_failures: self.poll_max_failures,
        }
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(
            self.api_base_url.clone(),
            self.api_token.clone(),
            self.request_timeout,
        )
        .context("Failed to build HTTP client")
    }
}

fn parse_or(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
        None => Ok(default),
    }
}

//! Client configuration, read from the environment.
//!
//! - `LEDGER_API_URL`: backend base URL (default `http://localhost:3000`)
//! - `LEDGER_SESSION_FILE`: where the active wallet id is persisted
//! - `LEDGER_HTTP_TIMEOUT_SECS`: request timeout in seconds (default 30)
//! - `LEDGER_VERSION_MISMATCH_MESSAGE`: the backend's version-mismatch message

use std::{path::PathBuf, time::Duration};

use reqwest::Url;
use thiserror::Error;
use tracing::warn;

use crate::store::http_store::DEFAULT_VERSION_MISMATCH_MESSAGE;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API url `{url}`: {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
    pub version_mismatch_message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            session_file: default_session_file(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            version_mismatch_message: DEFAULT_VERSION_MISMATCH_MESSAGE.to_owned(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source. Unusable values
    /// are logged and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("LEDGER_API_URL") {
            match parse_api_url(&url) {
                Ok(url) => config.api_url = url,
                Err(err) => warn!("{err}, using {DEFAULT_API_URL}"),
            }
        }
        if let Some(path) = lookup("LEDGER_SESSION_FILE").filter(|p| !p.trim().is_empty()) {
            config.session_file = PathBuf::from(path);
        }
        if let Some(secs) = lookup("LEDGER_HTTP_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => warn!(
                    "Invalid LEDGER_HTTP_TIMEOUT_SECS `{secs}`, using {DEFAULT_TIMEOUT_SECS}s"
                ),
            }
        }
        if let Some(message) = lookup("LEDGER_VERSION_MISMATCH_MESSAGE")
            .filter(|m| !m.trim().is_empty())
        {
            config.version_mismatch_message = message;
        }
        config
    }

    pub fn with_api_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_url = parse_api_url(url)?;
        Ok(self)
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = path.into();
        self
    }
}

fn parse_api_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url.trim()).map_err(|err| ConfigError::InvalidApiUrl {
        url: url.to_owned(),
        reason: err.to_string(),
    })?;
    if parsed.cannot_be_a_base() {
        return Err(ConfigError::InvalidApiUrl {
            url: url.to_owned(),
            reason: "not a base url".to_owned(),
        });
    }
    Ok(parsed)
}

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("default API url is valid")
}

fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("wallet-ledger").join("session.json"))
        .unwrap_or_else(|| PathBuf::from("wallet-ledger-session.json"))
}

use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Refresh interval cannot be 0")]
    ZeroRefreshInterval,

    #[error("Request timeout cannot be 0")]
    ZeroRequestTimeout,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    /// Upstream endpoints the fetcher pulls from
    pub sources: Sources,
    #[serde(default)]
    pub refresh: Refresh,
    #[serde(default)]
    pub data: DataFiles,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.refresh.interval_secs == 0 {
            return Err(ValidationError::ZeroRefreshInterval);
        }
        if self.refresh.request_timeout_secs == 0 {
            return Err(ValidationError::ZeroRequestTimeout);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Sources {
    /// Base URL of the per-application settings endpoint; the application
    /// identifier is appended as the final path segment.
    pub settings_url: Url,
    /// URL of the community flag tracker's newline-delimited variable list.
    pub tracker_url: Url,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Refresh {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Refresh {
    fn default() -> Self {
        Refresh {
            interval_secs: default_interval_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DataFiles {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_whitelist_path")]
    pub whitelist_path: PathBuf,
    #[serde(default = "default_risklist_path")]
    pub risklist_path: PathBuf,
}

impl Default for DataFiles {
    fn default() -> Self {
        DataFiles {
            snapshot_path: default_snapshot_path(),
            whitelist_path: default_whitelist_path(),
            risklist_path: default_risklist_path(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    "data/flag_snapshot.json".into()
}

fn default_whitelist_path() -> PathBuf {
    "data/whitelist.json".into()
}

fn default_risklist_path() -> PathBuf {
    "data/risklist.json".into()
}

//! Collector configuration
//!
//! Both entry points read a JSON configuration file once at startup. The
//! parsed value is passed explicitly into every component; nothing is kept in
//! process-wide state. A missing file, unparsable JSON or any missing/empty
//! required key is a [`IngestError::Config`] and the binary exits before any
//! network activity.

use crate::error::{IngestError, Result};
use crate::export::PollPolicy;
use crate::staging::expand_home;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Base URL of the analytics raw-data export API
pub const DEFAULT_API_BASE_URL: &str = "https://analytics.cloud.unity3d.com";

/// Trailing window requested by the checkpointed collector
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Per-request HTTP timeout, large enough for big result files
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Keys as they appear in the configuration file
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    user: Option<String>,
    password: Option<String>,
    postgres_server: Option<String>,
    database: Option<String>,
    local_collection_path: Option<String>,
    backup_collection_path: Option<String>,
    collection_path: Option<String>,
    unity_project_id: Option<String>,
    unity_export_api_key: Option<String>,
    api_base_url: Option<String>,
    lookback_days: Option<u32>,
    poll_interval_secs: Option<u64>,
    poll_timeout_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
}

impl RawConfig {
    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&text).map_err(|e| {
            IngestError::config(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Collects the names of missing required keys so they can be reported
/// together.
#[derive(Default)]
struct Required {
    missing: Vec<&'static str>,
}

impl Required {
    fn take(&mut self, key: &'static str, value: Option<String>) -> String {
        match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                self.missing.push(key);
                String::new()
            },
        }
    }

    fn finish(self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(IngestError::config(format!(
                "missing parameter(s) in config: {}",
                self.missing.join(", ")
            )))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Remote export API access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub api_base_url: String,
    pub project_id: String,
    pub api_key: String,
    pub http_timeout_secs: u64,
}

impl RemoteConfig {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            project_id: project_id.into(),
            api_key: api_key.into(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn from_raw(raw: &mut RawConfig, required: &mut Required) -> Self {
        let project_id = required.take("unity_project_id", raw.unity_project_id.take());
        let api_key = required.take("unity_export_api_key", raw.unity_export_api_key.take());

        let mut remote = Self::new(project_id, api_key);
        if let Some(url) = non_empty(raw.api_base_url.take()) {
            remote = remote.with_base_url(url);
        }
        if let Some(secs) = raw.http_timeout_secs {
            remote.http_timeout_secs = secs;
        }
        remote
    }
}

/// Wait-loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// `None` waits until the job completes, however long that takes
    pub timeout_secs: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: None,
        }
    }
}

impl PollConfig {
    fn from_raw(raw: &RawConfig) -> Result<Self> {
        let interval_secs = raw.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(IngestError::config("poll_interval_secs must be at least 1"));
        }

        Ok(Self {
            interval_secs,
            timeout_secs: raw.poll_timeout_secs,
        })
    }

    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Split `postgres_server` into host and optional port.
///
/// Accepts `host`, `host:port`, `[v6addr]` and `[v6addr]:port`. An unbracketed
/// value with more than one `:` is taken as a bare IPv6 address without port.
fn split_host_port(server: &str) -> Result<(String, Option<u16>)> {
    let invalid = || IngestError::config(format!("invalid postgres_server: {}", server));
    let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());

    if let Some(rest) = server.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail {
            "" => None,
            _ => Some(parse_port(tail.strip_prefix(':').ok_or_else(invalid)?)?),
        };
        return Ok((host.to_string(), port));
    }

    match server.split_once(':') {
        Some((host, port)) if !port.contains(':') => Ok((host.to_string(), Some(parse_port(port)?))),
        _ => Ok((server.to_string(), None)),
    }
}

/// PostgreSQL connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

impl DatabaseConfig {
    fn from_raw(raw: &mut RawConfig, required: &mut Required) -> Result<Self> {
        let user = required.take("user", raw.user.take());
        let password = required.take("password", raw.password.take());
        let server = required.take("postgres_server", raw.postgres_server.take());
        let database = required.take("database", raw.database.take());

        let (host, port) = split_host_port(&server)?;

        Ok(Self {
            user,
            password,
            host,
            port,
            database,
        })
    }
}

/// Configuration of the checkpointed `collect` run
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub remote: RemoteConfig,
    pub database: DatabaseConfig,
    /// Shared staging directory
    pub collection_path: PathBuf,
    /// Root of the dated backups, if any
    pub backup_path: Option<PathBuf>,
    pub lookback_days: u32,
    pub poll: PollConfig,
}

impl CollectConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = RawConfig::read(path.as_ref())?;
        let mut required = Required::default();

        let database = DatabaseConfig::from_raw(&mut raw, &mut required);
        let collection_path =
            required.take("local_collection_path", raw.local_collection_path.take());
        let remote = RemoteConfig::from_raw(&mut raw, &mut required);
        required.finish()?;
        let database = database?;

        Ok(Self {
            remote,
            database,
            collection_path: expand_home(&collection_path),
            backup_path: non_empty(raw.backup_collection_path.take()).map(|p| expand_home(&p)),
            lookback_days: raw.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS),
            poll: PollConfig::from_raw(&raw)?,
        })
    }
}

/// Configuration of the download-only `export` run
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub remote: RemoteConfig,
    /// Parent of the `<start>_<end>` download directories
    pub collection_path: PathBuf,
    pub poll: PollConfig,
}

impl ExportConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = RawConfig::read(path.as_ref())?;
        let mut required = Required::default();

        let collection_path = required.take("collection_path", raw.collection_path.take());
        let remote = RemoteConfig::from_raw(&mut raw, &mut required);
        required.finish()?;

        Ok(Self {
            remote,
            collection_path: expand_home(&collection_path),
            poll: PollConfig::from_raw(&raw)?,
        })
    }
}

//! Daemon configuration: a JSON file with camelCase keys.
//!
//! ```json
//! {
//!   "webhookUrl": "https://hooks.example.com/premortem/KEY",
//!   "anthropicApiKey": "sk-ant-...",
//!   "thresholds": { "memoryPercent": 90, "diskPercent": 85, "cpuPercent": 80 },
//!   "pollingInterval": 10000,
//!   "agentConfig": { "customPrompt": "This host runs the billing API." },
//!   "heartbeat": { "url": "https://hb.example.com/ping", "processName": "premortem-db1" }
//! }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(60_000);
pub const DEFAULT_ARCHIVE_DIR: &str = "~/.premortem-logs";
pub const DEFAULT_AGENT_COMMAND: &str = "claude";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub memory_percent: Option<u8>,
    pub disk_percent: Option<u8>,
    pub cpu_percent: Option<u8>,
    pub process_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub custom_prompt: Option<String>,
    // executable speaking the stream-json protocol; defaults to `claude`
    pub command: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
}

impl AgentConfig {
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_AGENT_COMMAND)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub url: String,
    pub process_name: String,
    pub interval: Duration,
}

#[derive(Clone)]
pub struct Config {
    pub webhook_url: String,
    pub anthropic_api_key: String,
    pub thresholds: ThresholdConfig,
    pub polling_interval: Duration,
    pub agent: AgentConfig,
    pub heartbeat: Option<HeartbeatConfig>,
    pub archive_dir: PathBuf,
}

// Keep the API key out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("webhook_url", &self.webhook_url)
            .field("anthropic_api_key", &"<redacted>")
            .field("thresholds", &self.thresholds)
            .field("polling_interval", &self.polling_interval)
            .field("agent", &self.agent)
            .field("heartbeat", &self.heartbeat)
            .field("archive_dir", &self.archive_dir)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    webhook_url: String,
    anthropic_api_key: String,
    thresholds: ThresholdConfig,
    #[serde(default)]
    polling_interval: Option<u64>,
    #[serde(default)]
    agent_config: Option<AgentConfig>,
    #[serde(default)]
    heartbeat: Option<RawHeartbeat>,
    #[serde(default)]
    archive_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHeartbeat {
    url: String,
    process_name: String,
    #[serde(default)]
    interval: Option<u64>,
}

/// Reads, validates and prepares the config at `path`, including creating the archive directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let config = resolve(raw)?;
    ensure_archive_dir(&config.archive_dir)?;
    Ok(config)
}

/// Parses and validates config text without touching the filesystem.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    resolve(raw)
}

fn resolve(raw: RawConfig) -> Result<Config, ConfigError> {
    check_url("webhookUrl", &raw.webhook_url)?;

    for (field, value) in [
        ("thresholds.memoryPercent", raw.thresholds.memory_percent),
        ("thresholds.diskPercent", raw.thresholds.disk_percent),
        ("thresholds.cpuPercent", raw.thresholds.cpu_percent),
    ] {
        if let Some(v) = value.filter(|v| *v > 100) {
            return Err(ConfigError::Invalid {
                field,
                reason: format!("{v} is not a percentage"),
            });
        }
    }

    let polling_interval = positive_millis("pollingInterval", raw.polling_interval)?
        .unwrap_or(DEFAULT_POLLING_INTERVAL);

    let heartbeat = match raw.heartbeat {
        Some(hb) => {
            check_url("heartbeat.url", &hb.url)?;
            Some(HeartbeatConfig {
                url: hb.url,
                process_name: hb.process_name,
                interval: positive_millis("heartbeat.interval", hb.interval)?
                    .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            })
        }
        None => None,
    };

    let archive_dir = expand_home(raw.archive_dir.as_deref().unwrap_or(DEFAULT_ARCHIVE_DIR))?;

    Ok(Config {
        webhook_url: raw.webhook_url,
        anthropic_api_key: raw.anthropic_api_key,
        thresholds: raw.thresholds,
        polling_interval,
        agent: raw.agent_config.unwrap_or_default(),
        heartbeat,
        archive_dir,
    })
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            field,
            reason: format!("{value:?} is not a valid URL ({e})"),
        })
}

fn positive_millis(field: &'static str, value: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".into(),
        }),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
        None => Ok(None),
    }
}

fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    let home = dirs_next::home_dir().ok_or_else(|| ConfigError::Invalid {
        field: "archiveDir",
        reason: "cannot expand ~ without a home directory".into(),
    })?;
    Ok(home.join(rest.trim_start_matches('/')))
}

/// Creates `dir` if needed and proves it is writable with a probe file.
pub fn ensure_archive_dir(dir: &Path) -> Result<(), ConfigError> {
    let archive_err = |source| ConfigError::ArchiveDir {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(archive_err)?;
    let probe = dir.join(format!(
        ".premortem-test-{}",
        chrono::Utc::now().timestamp_millis()
    ));
    fs::write(&probe, b"test").map_err(archive_err)?;
    fs::remove_file(&probe).map_err(archive_err)?;
    Ok(())
}

//! Error types, one enum per concern.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config field \"{field}\": {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("archive directory {path} is not usable: {source}")]
    ArchiveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics collection failed: {0}")]
    Collection(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed agent message: {0}")]
    Malformed(String),

    #[error("agent exited with {0}")]
    Exited(std::process::ExitStatus),

    #[error("agent stream ended without a result message")]
    Incomplete,
}

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("Heartbeat validation failed: {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Heartbeat validation failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("API key cannot be empty. Please check your configuration.")]
    Empty,

    #[error("Invalid Anthropic API key. Please check your configuration.")]
    Invalid,

    #[error("Anthropic API is currently unavailable. Please try again later.")]
    Unavailable,

    #[error("API key check failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("API key check failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Heartbeat(#[from] HeartbeatError),

    #[error("daemon is already running")]
    AlreadyRunning,
}

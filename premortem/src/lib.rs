//! premortem: watches host vitals and, when a threshold is crossed, runs an LLM
//! diagnosis whose output is streamed to a webhook.

pub mod agent;
pub mod api_key;
pub mod config;
pub mod daemon;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod prompt;
pub mod state;
pub mod thresholds;
pub mod types;
pub mod webhook;

pub use config::{load_config, Config};
pub use daemon::{Collaborators, Daemon};
pub use state::DaemonState;

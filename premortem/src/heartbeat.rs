//! Liveness pings to an external monitor.
//!
//! `validate_endpoint` is the startup check and is the only call whose failure is surfaced.
//! After that, `start` fires one ping immediately and then one per interval; each ping is a
//! detached task so a slow endpoint never delays the schedule.

use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::HeartbeatError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub process_name: String,
    pub timestamp: String,
    pub uptime: f64,
}

impl HeartbeatPayload {
    pub fn new(process_name: &str, uptime: Duration) -> Self {
        Self {
            process_name: process_name.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime: uptime.as_secs_f64(),
        }
    }
}

pub async fn validate_endpoint(
    client: &reqwest::Client,
    url: &str,
    process_name: &str,
) -> Result<(), HeartbeatError> {
    let payload = HeartbeatPayload::new(process_name, Duration::ZERO);
    let resp = client.post(url).json(&payload).send().await?;
    if !resp.status().is_success() {
        return Err(HeartbeatError::Status {
            status: resp.status(),
        });
    }
    Ok(())
}

/// Cancels the reporter when `cancel` is called or the handle is dropped.
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn start(
    client: reqwest::Client,
    url: String,
    process_name: String,
    period: Duration,
    started_at: Instant,
) -> HeartbeatHandle {
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // first tick completes immediately
            ticker.tick().await;
            let payload = HeartbeatPayload::new(&process_name, started_at.elapsed());
            tokio::spawn(send_heartbeat(client.clone(), url.clone(), payload));
        }
    });
    HeartbeatHandle { task }
}

async fn send_heartbeat(client: reqwest::Client, url: String, payload: HeartbeatPayload) {
    match client.post(&url).json(&payload).send().await {
        Ok(resp) if resp.status().is_success() => debug!("Sent heartbeat..."),
        Ok(resp) => warn!("Heartbeat failed: {}", resp.status()),
        Err(e) => warn!("Heartbeat failed: {e}"),
    }
}

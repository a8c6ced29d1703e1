//! Daemon controller: poll loop, breach handling and the single diagnostic session.
//!
//! Each tick fetches metrics and evaluates thresholds. A breach launches a diagnostic
//! session on a detached task unless one is already running, in which case the breach is
//! dropped. The session task forwards every agent message to the webhook in order, with
//! one synthetic vitals message ahead of the first message that carries a session id, and
//! frees the session slot when the result arrives or the session fails.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::agent::{AgentStream, ClaudeCliAgent, DiagnosticAgent, SessionRequest};
use crate::config::Config;
use crate::error::{AgentError, DaemonError};
use crate::heartbeat::{self, HeartbeatHandle};
use crate::metrics::{os_description, MetricsSource, SysinfoMetrics};
use crate::prompt::{generate_prompt, vitals_summary};
use crate::state::{DaemonState, SharedState};
use crate::thresholds;
use crate::types::{SystemMetrics, ThresholdBreach};
use crate::webhook::{DeliverySink, WebhookSink};

/// External pieces the daemon talks to. Swapped for fakes in tests.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics: Arc<dyn MetricsSource>,
    pub agent: Arc<dyn DiagnosticAgent>,
    pub sink: Arc<dyn DeliverySink>,
    pub http: reqwest::Client,
}

impl Collaborators {
    pub fn production() -> Self {
        let http = reqwest::Client::new();
        Self {
            metrics: Arc::new(SysinfoMetrics::new()),
            agent: Arc::new(ClaudeCliAgent),
            sink: Arc::new(WebhookSink::new(http.clone())),
            http,
        }
    }
}

#[derive(Default)]
struct Tasks {
    poll: Option<JoinHandle<()>>,
    heartbeat: Option<HeartbeatHandle>,
}

struct Inner {
    config: Config,
    deps: Collaborators,
    state: SharedState,
    tasks: Mutex<Tasks>,
}

#[derive(Clone)]
pub struct Daemon {
    inner: Arc<Inner>,
}

impl Daemon {
    pub fn new(config: Config, deps: Collaborators) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                state: SharedState::default(),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    /// Validates the heartbeat endpoint (if configured), starts the reporter, polls once
    /// and schedules the recurring poll. A heartbeat validation failure aborts before any poll.
    pub async fn start(&self) -> Result<(), DaemonError> {
        {
            let mut st = self.inner.state.lock().await;
            if st.running {
                return Err(DaemonError::AlreadyRunning);
            }
            st.restart();
        }
        info!("Premortem daemon starting...");
        let started_at = std::time::Instant::now();
        let config = &self.inner.config;

        if let Some(name) = &config.thresholds.process_name {
            warn!("process thresholds are not evaluated; ignoring processName {name:?}");
        }

        if let Some(hb) = &config.heartbeat {
            if let Err(e) =
                heartbeat::validate_endpoint(&self.inner.deps.http, &hb.url, &hb.process_name).await
            {
                self.inner.state.lock().await.running = false;
                return Err(e.into());
            }
            // stop() sets `running` before taking the tasks; checking under the tasks lock
            // means either it sees this handle or the handle is never created
            let mut tasks = self.inner.tasks.lock().await;
            if !self.inner.state.lock().await.running {
                info!("Daemon stopped during startup");
                return Ok(());
            }
            tasks.heartbeat = Some(heartbeat::start(
                self.inner.deps.http.clone(),
                hb.url.clone(),
                hb.process_name.clone(),
                hb.interval,
                started_at,
            ));
        }

        self.inner.poll_once().await;

        let mut tasks = self.inner.tasks.lock().await;
        if !self.inner.state.lock().await.running {
            // stopped during the first poll
            if let Some(hb) = tasks.heartbeat.take() {
                hb.cancel();
            }
            return Ok(());
        }
        tasks.poll = Some(tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            config.polling_interval,
        )));
        info!(
            "Daemon monitoring started (interval: {}ms)",
            config.polling_interval.as_millis()
        );
        Ok(())
    }

    /// One poll tick. No-op unless the daemon is running.
    pub async fn poll_once(&self) {
        self.inner.poll_once().await;
    }

    /// Cancels future polls and heartbeats. In-flight sessions and deliveries finish on
    /// their own. Safe to call repeatedly.
    pub async fn stop(&self) {
        let was_running = std::mem::replace(&mut self.inner.state.lock().await.running, false);
        let tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        if let Some(poll) = tasks.poll {
            poll.abort();
        }
        if let Some(hb) = tasks.heartbeat {
            hb.cancel();
        }
        if was_running {
            info!("Daemon stopped");
        }
    }

    pub async fn state(&self) -> DaemonState {
        self.inner.state.lock().await.clone()
    }
}

async fn poll_loop(inner: Weak<Inner>, period: Duration) {
    // the first poll already ran inside start()
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.poll_once().await;
    }
}

impl Inner {
    async fn poll_once(self: &Arc<Self>) {
        if !self.state.lock().await.running {
            return;
        }

        let metrics = match self.deps.metrics.fetch().await {
            Ok(m) => m,
            Err(e) => {
                error!("Monitoring error: {e}");
                return;
            }
        };
        debug!(?metrics, "poll");

        let Some(breach) = thresholds::evaluate(&metrics, &self.config.thresholds) else {
            return;
        };

        // check-and-set under one guard, no await in between
        let seq = {
            let mut st = self.state.lock().await;
            if st.running {
                st.try_begin_session()
            } else {
                None
            }
        };
        let Some(seq) = seq else {
            debug!(kind = %breach.kind, "breach ignored, diagnostic session already active");
            return;
        };

        warn!(
            "Threshold breach detected: {} at {}% (threshold: {}%)",
            breach.kind, breach.current_value, breach.threshold_value
        );

        let request = SessionRequest {
            prompt: generate_prompt(
                &breach,
                &metrics,
                &os_description(),
                self.config.agent.custom_prompt.as_deref(),
            ),
            api_key: self.config.anthropic_api_key.clone(),
            config: self.config.agent.clone(),
            working_dir: self.config.archive_dir.clone(),
        };
        let stream = self.deps.agent.start(request);
        tokio::spawn(run_session(Arc::clone(self), seq, stream, breach, metrics));
    }
}

async fn run_session(
    inner: Arc<Inner>,
    seq: u64,
    mut stream: AgentStream,
    breach: ThresholdBreach,
    metrics: SystemMetrics,
) {
    let url = inner.config.webhook_url.as_str();
    let mut vitals_sent = false;

    let outcome = loop {
        match stream.next().await {
            Some(Ok(msg)) => {
                if let Some(id) = msg.session_id() {
                    {
                        let mut st = inner.state.lock().await;
                        if st.session_seq == seq {
                            st.session_id = Some(id.to_string());
                        }
                    }
                    if !vitals_sent {
                        vitals_sent = true;
                        inner
                            .deps
                            .sink
                            .send(url, &vitals_message(id, &breach, &metrics))
                            .await;
                    }
                }
                inner.deps.sink.send(url, &msg.to_value()).await;
                if msg.is_result() {
                    break Ok(());
                }
            }
            Some(Err(e)) => break Err(e),
            None => break Err(AgentError::Incomplete),
        }
    };
    drop(stream);

    match outcome {
        Ok(()) => info!("Agent completed - resetting daemon state"),
        Err(e) => error!("Agent error: {e}"),
    }
    if !inner.state.lock().await.end_session(seq) {
        debug!(seq, "session slot already released");
    }
}

fn vitals_message(session_id: &str, breach: &ThresholdBreach, metrics: &SystemMetrics) -> Value {
    json!({
        "type": "system",
        "session_id": session_id,
        "message": {
            "role": "system",
            "content": vitals_summary(breach, metrics),
        },
    })
}

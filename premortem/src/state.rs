//! Daemon lifecycle state: owned by one `Daemon`, shared with its poll and session tasks.

use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedState = Arc<Mutex<DaemonState>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonState {
    pub running: bool,
    // true from session launch until its result (or failure) is seen
    pub agent_running: bool,
    pub breach_detected: bool,
    pub session_id: Option<String>,
    // bumped on every claimed slot; a session only frees the slot it claimed
    pub session_seq: u64,
}

impl DaemonState {
    /// Fresh state for a daemon that is starting.
    pub fn started() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    /// Marks the daemon running again. A session that outlived the last `stop` keeps
    /// its slot, so a restart cannot launch a second one beside it.
    pub fn restart(&mut self) {
        self.running = true;
        if !self.agent_running {
            self.breach_detected = false;
            self.session_id = None;
        }
    }

    /// Claims the single session slot, returning its sequence number. `None` when a
    /// session is already active.
    pub fn try_begin_session(&mut self) -> Option<u64> {
        if self.agent_running {
            return None;
        }
        self.agent_running = true;
        self.breach_detected = true;
        self.session_seq += 1;
        Some(self.session_seq)
    }

    /// Frees the slot if `seq` still owns it. Returns whether anything was reset.
    pub fn end_session(&mut self, seq: u64) -> bool {
        if !self.agent_running || self.session_seq != seq {
            return false;
        }
        self.agent_running = false;
        self.breach_detected = false;
        self.session_id = None;
        true
    }
}

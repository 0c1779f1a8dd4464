//! Interrupt outcomes

use crate::domain::identity::Identity;
use crate::domain::session::SessionId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// What an interrupt call actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptOutcome {
    /// Nothing live for the identity; no module was invoked
    NoActiveSession,
    /// This call ran the broadcast-and-wait protocol
    Interrupted,
    /// Another call was already interrupting; this is its result
    Joined,
}

/// Result of interrupting one identity
#[derive(Debug, Clone, Serialize)]
pub struct InterruptResult {
    pub identity: Identity,
    pub session_id: Option<SessionId>,
    pub outcome: InterruptOutcome,
    /// The session reached Interrupted (always true for a no-op)
    pub success: bool,
    pub acknowledged_modules: Vec<String>,
    pub timed_out_modules: Vec<String>,
    pub failed_modules: Vec<String>,
    /// Unhealthy modules not invoked this time
    pub skipped_modules: Vec<String>,
    pub elapsed: Duration,
}

impl InterruptResult {
    pub(crate) fn no_op(identity: Identity, elapsed: Duration) -> Self {
        Self {
            identity,
            session_id: None,
            outcome: InterruptOutcome::NoActiveSession,
            success: true,
            acknowledged_modules: Vec::new(),
            timed_out_modules: Vec::new(),
            failed_modules: Vec::new(),
            skipped_modules: Vec::new(),
            elapsed,
        }
    }

    /// Whether a session was actually interrupted by this call or the one it joined
    pub fn interrupted_session(&self) -> bool {
        self.session_id.is_some() && self.outcome != InterruptOutcome::NoActiveSession
    }

    /// Every invoked module acknowledged in time
    pub fn fully_acknowledged(&self) -> bool {
        self.timed_out_modules.is_empty() && self.failed_modules.is_empty()
    }
}

/// Result of a process-wide interrupt
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterruptAllSummary {
    pub reason: String,
    /// Sessions actually interrupted
    pub interrupted: usize,
    /// Modules that missed the acknowledgment bound for any session
    pub timed_out_modules: BTreeSet<String>,
    pub failed_modules: BTreeSet<String>,
    /// Identities whose interrupt returned an error
    pub failures: Vec<String>,
    pub elapsed: Duration,
}

impl InterruptAllSummary {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} sessions interrupted", self.interrupted)];

        if !self.timed_out_modules.is_empty() {
            parts.push(format!(
                "timed out: {}",
                self.timed_out_modules.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.failed_modules.is_empty() {
            parts.push(format!(
                "failed: {}",
                self.failed_modules.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.failures.is_empty() {
            parts.push(format!("{} errors", self.failures.len()));
        }

        format!("{} ({}ms, reason: {})", parts.join("; "), self.elapsed.as_millis(), self.reason)
    }

    pub fn has_warnings(&self) -> bool {
        !self.timed_out_modules.is_empty() || !self.failed_modules.is_empty() || !self.failures.is_empty()
    }
}

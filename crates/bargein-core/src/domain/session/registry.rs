//! Session registry
//!
//! Owns the authoritative set of live sessions, indexed by session id and by
//! identity. Every mutation takes the same write lock, so `create`, `mark` and
//! `sweep` never observe each other half-done.

use super::session::{Session, SessionContext, SessionId, SessionInfo, SessionStatus};
use crate::config::Config;
use crate::domain::identity::Identity;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outcome of a sweep pass
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    /// Sessions moved to Expired by this pass
    pub expired: Vec<Session>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Live sessions only (Active or Interrupting)
    sessions: HashMap<SessionId, Session>,
    by_identity: HashMap<Identity, SessionId>,
    /// Recently ended sessions, oldest first
    history: VecDeque<Session>,
    last_sweep: Option<DateTime<Utc>>,
}

impl RegistryState {
    fn retire(&mut self, session_id: SessionId, history_limit: usize) {
        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };
        if self.by_identity.get(&session.identity) == Some(&session_id) {
            self.by_identity.remove(&session.identity);
        }
        if history_limit == 0 {
            return;
        }
        self.history.push_back(session);
        while self.history.len() > history_limit {
            self.history.pop_front();
        }
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    max_sessions: usize,
    history_limit: usize,
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, history_limit: usize) -> Self {
        Self {
            max_sessions,
            history_limit,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.registry.max_sessions, config.registry.history_limit)
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Admit a new Active session for `identity`
    ///
    /// Fails with `CapacityExceeded` at the ceiling, and with `IdentityBusy`
    /// if the identity still owns a live session. Callers wanting
    /// supersede semantics go through `Coordinator::create_session`, which
    /// interrupts the old session first.
    pub async fn create(&self, identity: Identity, context: SessionContext) -> Result<Session> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.by_identity.get(&identity) {
            return Err(Error::IdentityBusy {
                identity,
                session_id: *existing,
            });
        }

        let active = state.sessions.len();
        if active >= self.max_sessions {
            debug!(active, limit = self.max_sessions, "Rejecting session, registry full");
            return Err(Error::CapacityExceeded {
                active,
                limit: self.max_sessions,
            });
        }

        let session = Session::new(identity, context);
        state.by_identity.insert(session.identity.clone(), session.id);
        state.sessions.insert(session.id, session.clone());

        info!(
            session_id = %session.id,
            identity = %session.identity,
            "Created new session"
        );
        Ok(session)
    }

    /// Record activity; false when the session is no longer live
    pub async fn heartbeat(&self, session_id: SessionId) -> bool {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Get a session by ID, searching live sessions then history
    pub async fn get(&self, session_id: SessionId) -> Option<Session> {
        let state = self.state.read().await;
        state
            .sessions
            .get(&session_id)
            .or_else(|| state.history.iter().rev().find(|s| s.id == session_id))
            .cloned()
    }

    /// The live session owned by `identity`, if any
    pub async fn active_for(&self, identity: &Identity) -> Option<Session> {
        let state = self.state.read().await;
        state
            .by_identity
            .get(identity)
            .and_then(|id| state.sessions.get(id))
            .cloned()
    }

    /// Transition a session, retiring it to history when the new status is terminal
    pub async fn mark(&self, session_id: SessionId, status: SessionStatus) -> Result<Session> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let snapshot = match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.transition(status)?;
                session.clone()
            }
            None => {
                return Err(
                    match state.history.iter().rev().find(|s| s.id == session_id) {
                        Some(ended) => Error::InvalidTransition {
                            session_id,
                            from: ended.status,
                            to: status,
                        },
                        None => Error::SessionNotFound(session_id),
                    },
                );
            }
        };

        if status.is_terminal() {
            state.retire(session_id, self.history_limit);
        }

        debug!(session_id = %session_id, status = %status, "Session status changed");
        Ok(snapshot)
    }

    /// Mark a session as finished normally
    pub async fn complete(&self, session_id: SessionId) -> Result<Session> {
        let session = self.mark(session_id, SessionStatus::Completed).await?;
        info!(session_id = %session_id, "Session completed");
        Ok(session)
    }

    /// Expire Active sessions idle for longer than `timeout`
    ///
    /// Interrupting sessions are left alone; the interrupt that owns them
    /// is already bounded by the acknowledgment timeout.
    pub async fn sweep(&self, now: DateTime<Utc>, timeout: Duration) -> SweepReport {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let stale: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|s| s.is_active())
            .filter(|s| {
                s.idle_for(now)
                    .to_std()
                    .map(|idle| idle > timeout)
                    .unwrap_or(false)
            })
            .map(|s| s.id)
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for session_id in stale {
            if let Some(session) = state.sessions.get_mut(&session_id) {
                if session.transition(SessionStatus::Expired).is_ok() {
                    expired.push(session.clone());
                }
            }
            state.retire(session_id, self.history_limit);
        }

        state.last_sweep = Some(now);

        if expired.is_empty() {
            debug!(live = state.sessions.len(), "Sweep found no stale sessions");
        } else {
            info!(
                expired = expired.len(),
                live = state.sessions.len(),
                "Sweep expired stale sessions"
            );
        }

        SweepReport {
            swept_at: now,
            expired,
        }
    }

    /// Number of Active or Interrupting sessions
    pub async fn live_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Count sessions with `status`, live or in history
    pub async fn count_by_status(&self, status: SessionStatus) -> usize {
        let state = self.state.read().await;
        if status.is_live() {
            state.sessions.values().filter(|s| s.status == status).count()
        } else {
            state.history.iter().filter(|s| s.status == status).count()
        }
    }

    /// Identities currently owning an Active session
    pub async fn active_identities(&self) -> Vec<Identity> {
        let state = self.state.read().await;
        state
            .sessions
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.identity.clone())
            .collect()
    }

    /// List live sessions, most recently active first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let state = self.state.read().await;
        let mut infos: Vec<SessionInfo> = state.sessions.values().map(SessionInfo::from).collect();
        infos.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        infos
    }

    /// Recently ended sessions, newest first
    pub async fn history(&self) -> Vec<SessionInfo> {
        let state = self.state.read().await;
        state.history.iter().rev().map(SessionInfo::from).collect()
    }

    pub async fn last_sweep(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_sweep
    }
}

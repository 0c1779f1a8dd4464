//! Session entity and related types
//!
//! Defines the core Session type and its lifecycle statuses.

use crate::domain::identity::Identity;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Opaque payload attached to a session by its creator
pub type SessionContext = HashMap<String, serde_json::Value>;

/// Unique session identifier (128-bit random)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session status indicating where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is live and producing work
    Active,
    /// Cancellation has been broadcast, waiting for modules to acknowledge
    Interrupting,
    /// Session was cancelled
    Interrupted,
    /// Session finished normally
    Completed,
    /// Session stopped heartbeating and was reclaimed by a sweep
    Expired,
}

impl SessionStatus {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "interrupting" => Some(Self::Interrupting),
            "interrupted" => Some(Self::Interrupted),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Interrupting => "interrupting",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    /// Active or Interrupting; counts against capacity
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Interrupting)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Active, Interrupting)
                | (Active, Interrupted)
                | (Active, Completed)
                | (Active, Expired)
                | (Interrupting, Interrupted)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One logical unit of in-flight work owned by an identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,

    /// Client that owns the session
    pub identity: Identity,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Last heartbeat or state change
    pub last_activity: DateTime<Utc>,

    /// When the session reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,

    /// Current session status
    pub status: SessionStatus,

    /// Caller-supplied payload
    pub context: SessionContext,
}

impl Session {
    /// Create a new active session
    pub fn new(identity: Identity, context: SessionContext) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            identity,
            created_at: now,
            last_activity: now,
            ended_at: None,
            status: SessionStatus::Active,
            context,
        }
    }

    /// Update the last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Move to `next`, rejecting illegal steps
    pub fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                session_id: self.id,
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.touch();
        if next.is_terminal() {
            self.ended_at = Some(self.last_activity);
        }
        Ok(())
    }

    /// Time since the last heartbeat, as of `now`
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }

    /// Get the duration of the session
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at.unwrap_or_else(Utc::now) - self.created_at
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Lightweight session info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub identity: Identity,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            identity: session.identity.clone(),
            status: session.status,
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::parse("HW1").unwrap()
    }

    #[test]
    fn test_session_status_from_str() {
        assert_eq!(SessionStatus::from_str("active"), Some(SessionStatus::Active));
        assert_eq!(
            SessionStatus::from_str("INTERRUPTING"),
            Some(SessionStatus::Interrupting)
        );
        assert_eq!(SessionStatus::from_str("Expired"), Some(SessionStatus::Expired));
        assert_eq!(SessionStatus::from_str("paused"), None);
    }

    #[test]
    fn test_session_status_liveness() {
        assert!(SessionStatus::Active.is_live());
        assert!(SessionStatus::Interrupting.is_live());
        assert!(SessionStatus::Interrupted.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
    }

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        assert!(Active.can_transition_to(Interrupting));
        assert!(Active.can_transition_to(Completed));
        assert!(Interrupting.can_transition_to(Interrupted));

        assert!(!Interrupting.can_transition_to(Active));
        assert!(!Interrupting.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Interrupted.can_transition_to(Interrupted));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_session_creation() {
        let mut context = SessionContext::new();
        context.insert("voice".to_string(), serde_json::json!("alloy"));
        let session = Session::new(identity(), context);

        assert!(session.is_active());
        assert_eq!(session.created_at, session.last_activity);
        assert!(session.ended_at.is_none());
        assert_eq!(session.context["voice"], "alloy");
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = Session::new(identity(), SessionContext::new());

        session.transition(SessionStatus::Interrupting).unwrap();
        assert!(session.status.is_live());
        assert!(session.ended_at.is_none());

        session.transition(SessionStatus::Interrupted).unwrap();
        assert!(session.ended_at.is_some());

        let err = session.transition(SessionStatus::Active).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: SessionStatus::Interrupted,
                to: SessionStatus::Active,
                ..
            }
        ));
    }

    #[test]
    fn test_idle_for() {
        let session = Session::new(identity(), SessionContext::new());
        let later = session.last_activity + chrono::Duration::seconds(7);
        assert_eq!(session.idle_for(later), chrono::Duration::seconds(7));
    }

    #[test]
    fn test_session_info_from_session() {
        let session = Session::new(identity(), SessionContext::new());
        let info: SessionInfo = (&session).into();

        assert_eq!(info.id, session.id);
        assert_eq!(info.identity, session.identity);
        assert_eq!(info.status, SessionStatus::Active);
    }
}

//! Error types for Bargein

use crate::domain::identity::Identity;
use crate::domain::session::{SessionId, SessionStatus};
use thiserror::Error;

/// Result type alias using Bargein's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Bargein error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Session errors (E001-E099)
    #[error("Session capacity exceeded ({active}/{limit} live sessions). Retry later or raise `registry.max_sessions`.")]
    CapacityExceeded { active: usize, limit: usize },

    #[error("Session '{0}' not found")]
    SessionNotFound(SessionId),

    #[error("Invalid transition for session '{session_id}': {from} -> {to}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Identity '{identity}' already owns live session '{session_id}'")]
    IdentityBusy {
        identity: Identity,
        session_id: SessionId,
    },

    #[error("Coordinator is shutting down; no new sessions are accepted")]
    ShuttingDown,

    // Interrupt errors (E100-E199)
    #[error("Module '{module}' did not acknowledge the interrupt within {waited_ms} ms")]
    ModuleAcknowledgmentTimeout { module: String, waited_ms: u64 },

    #[error("Module '{module}' failed to stop: {message}")]
    ModuleFailed { module: String, message: String },

    #[error("Observer limit reached ({0}). Raise `interrupt.max_observers` to register more.")]
    ObserverLimit(usize),

    // Identity errors (E200-E299)
    #[error("Identity persistence failed: {0}. Falling back to an in-memory identity.")]
    IdentityPersistence(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "E001",
            Self::SessionNotFound(_) => "E002",
            Self::InvalidTransition { .. } => "E003",
            Self::IdentityBusy { .. } => "E004",
            Self::ShuttingDown => "E005",
            Self::ModuleAcknowledgmentTimeout { .. } => "E100",
            Self::ModuleFailed { .. } => "E101",
            Self::ObserverLimit(_) => "E102",
            Self::IdentityPersistence(_) => "E200",
            Self::InvalidIdentity(_) => "E201",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::CapacityExceeded { limit, .. } => Some(format!(
                "bargein config set registry.max_sessions {}",
                limit.saturating_mul(2)
            )),
            Self::ObserverLimit(limit) => Some(format!(
                "bargein config set interrupt.max_observers {}",
                limit.saturating_mul(2)
            )),
            Self::IdentityPersistence(_) => Some("bargein identity regenerate".to_string()),
            Self::ConfigError(_) => Some("bargein config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error indicates a bug in the caller rather than a routine outcome
    pub fn is_bug(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::IdentityBusy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            Error::CapacityExceeded { active: 3, limit: 3 },
            Error::SessionNotFound(SessionId::new()),
            Error::ShuttingDown,
            Error::ModuleAcknowledgmentTimeout {
                module: "audio".to_string(),
                waited_ms: 5000,
            },
            Error::ObserverLimit(4),
            Error::IdentityPersistence("disk full".to_string()),
            Error::ConfigError("bad".to_string()),
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_capacity_message_and_suggestion() {
        let err = Error::CapacityExceeded { active: 3, limit: 3 };
        assert!(err.to_string().contains("3/3"));
        assert_eq!(
            err.suggestion(),
            Some("bargein config set registry.max_sessions 6".to_string())
        );
        assert!(!err.is_bug());
    }

    #[test]
    fn test_suggestion_saturates_on_huge_limits() {
        let err = Error::CapacityExceeded {
            active: usize::MAX,
            limit: usize::MAX,
        };
        assert_eq!(
            err.suggestion(),
            Some(format!("bargein config set registry.max_sessions {}", usize::MAX))
        );

        let err = Error::ObserverLimit(usize::MAX);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_invalid_transition_is_bug() {
        let err = Error::InvalidTransition {
            session_id: SessionId::new(),
            from: SessionStatus::Completed,
            to: SessionStatus::Active,
        };
        assert!(err.is_bug());
        assert!(err.to_string().contains("completed -> active"));
    }

    #[test]
    fn test_module_timeout_message() {
        let err = Error::ModuleAcknowledgmentTimeout {
            module: "audio".to_string(),
            waited_ms: 5000,
        };
        assert!(err.to_string().contains("audio"));
        assert!(err.to_string().contains("5000 ms"));
        assert!(err.suggestion().is_none());
    }
}

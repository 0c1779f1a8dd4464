//! Bargein Core Library
//!
//! Session and interrupt coordination for pipelines that stream output on
//! behalf of a client and must stop promptly when that client starts over:
//! - Stable per-client identity, persisted across restarts
//! - Session registry with a global ceiling and inactivity sweep
//! - Bounded broadcast-and-wait interrupts across registered modules
//! - Cooperative interrupt flags for producers to poll
//! - A facade that supersedes a client's old session before admitting a new one

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::{Coordinator, CoordinatorStats};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::application::{Coordinator, CoordinatorStats};
    pub use crate::config::Config;
    pub use crate::domain::identity::{Identity, IdentityProvider};
    pub use crate::domain::interrupt::{
        FnModule, InterruptAllSummary, InterruptOutcome, InterruptResult, Interruptible,
    };
    pub use crate::domain::session::{Session, SessionContext, SessionId, SessionStatus};
    pub use crate::error::{Error, Result};
}

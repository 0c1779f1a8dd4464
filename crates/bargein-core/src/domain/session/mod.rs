//! Session domain module
//!
//! # Architecture
//!
//! - **Entities**: `Session`, `SessionInfo`
//! - **Registry**: `SessionRegistry`, the single owner of session state
//!
//! # Lifecycle
//!
//! ```text
//! Active ──► Interrupting ──► Interrupted
//!   │ └────────────────────► Interrupted
//!   ├──► Completed
//!   └──► Expired   (sweep)
//! ```
//!
//! Terminal sessions leave the live indices and are kept in a bounded
//! history for lookups.

pub mod registry;
pub mod session;

pub use registry::{SessionRegistry, SweepReport};
pub use session::{Session, SessionContext, SessionId, SessionInfo, SessionStatus};

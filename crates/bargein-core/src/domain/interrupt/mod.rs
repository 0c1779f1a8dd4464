//! Interrupt domain module
//!
//! Two cancellation channels share one set of flags:
//!
//! - **Cooperative**: producers poll `should_interrupt` between units of work
//! - **Coercive**: `InterruptCoordinator::interrupt` asks every registered
//!   [`Interruptible`] module to stop and waits, bounded, for each to confirm
//!
//! Modules that keep missing the acknowledgment bound are marked unhealthy
//! and skipped until a re-probe interval elapses.

pub mod coordinator;
pub mod flags;
pub mod module;
pub mod observer;
pub mod result;

pub use coordinator::{InterruptCoordinator, InterruptSettings, InterruptStats};
pub use flags::InterruptFlags;
pub use module::{BlockingModule, FnModule, Interruptible, ModuleHealth, ModuleStats};
pub use observer::{CallbackObserver, InterruptObserver};
pub use result::{InterruptAllSummary, InterruptOutcome, InterruptResult};

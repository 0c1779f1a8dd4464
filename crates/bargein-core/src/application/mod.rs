//! Application layer
//!
//! The coordination facade and the background sweeper that keeps the
//! registry free of sessions whose clients went away.

pub mod coordination;
pub mod sweeper;

pub use coordination::{Coordinator, CoordinatorStats};
pub use sweeper::Sweeper;

//! Infrastructure layer
//!
//! Contains implementations for external systems like files and keyrings.

pub mod identity;

//! Domain layer
//!
//! Identity, session lifecycle and interrupt protocol. Nothing here touches
//! the filesystem or the OS keyring directly; persistence goes through the
//! `IdentityStore` trait.

pub mod identity;
pub mod interrupt;
pub mod session;

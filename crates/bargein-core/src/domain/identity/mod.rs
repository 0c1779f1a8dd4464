//! Client identity
//!
//! Produces a stable identifier for the calling client, derived from machine
//! characteristics and cached through an external store so it survives
//! restarts.
//!
//! # Example
//!
//! ```ignore
//! use bargein_core::domain::identity::IdentityProvider;
//! use bargein_core::infrastructure::identity::FileIdentityStore;
//!
//! let store = Arc::new(FileIdentityStore::at_default_location()?);
//! let provider = IdentityProvider::for_host(store);
//! let identity = provider.get_identity().await;
//! ```

pub mod identity;
pub mod provider;
pub mod source;
pub mod store;

pub use identity::Identity;
pub use provider::{IdentityOrigin, IdentityProvider, IdentityResolution};
pub use source::{FingerprintSource, HostFingerprintSource, StaticFingerprintSource};
pub use store::IdentityStore;

//! Identity store implementations

pub mod file;
pub mod keyring;
pub mod memory;

pub use file::FileIdentityStore;
pub use keyring::KeyringIdentityStore;
pub use memory::InMemoryIdentityStore;

use crate::config::IdentityStoreKind;
use crate::domain::identity::IdentityStore;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Open the identity store selected in configuration
pub fn open_store(kind: IdentityStoreKind) -> Result<Arc<dyn IdentityStore>> {
    let store: Arc<dyn IdentityStore> = match kind {
        IdentityStoreKind::File => Arc::new(
            FileIdentityStore::at_default_location()
                .map_err(|e| Error::ConfigError(e.to_string()))?,
        ),
        IdentityStoreKind::Keyring => Arc::new(KeyringIdentityStore::new()),
        IdentityStoreKind::Memory => Arc::new(InMemoryIdentityStore::new()),
    };
    Ok(store)
}

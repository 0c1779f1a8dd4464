//! OS keyring identity store
//!
//! Keeps the identity in the operating system's credential store (macOS
//! Keychain, Windows Credential Manager, Linux Secret Service).

use crate::domain::identity::IdentityStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use keyring::Entry;

/// Service name used for keyring storage
const KEYRING_SERVICE: &str = "bargein";

/// Default username for keyring entries
const KEYRING_USER: &str = "client-identity";

#[derive(Debug, Clone)]
pub struct KeyringIdentityStore {
    service: String,
    user: String,
}

impl Default for KeyringIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringIdentityStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    /// Create a keyring store with custom service/user names
    pub fn with_names(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, &self.user).map_err(|e| {
            Error::IdentityPersistence(format!("Failed to create keyring entry: {}", e))
        })
    }
}

#[async_trait]
impl IdentityStore for KeyringIdentityStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let entry = self.entry()?;

        // keyring operations are blocking
        let result = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(|e| Error::Other(format!("Task join error: {}", e)))?;

        match result {
            Ok(value) => Ok(Some(value.into_bytes())),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::IdentityPersistence(format!(
                "Failed to read identity from keyring: {}",
                e
            ))),
        }
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::IdentityPersistence(format!("Identity is not UTF-8: {}", e)))?;
        let entry = self.entry()?;

        tokio::task::spawn_blocking(move || {
            entry.set_password(&value).map_err(|e| {
                Error::IdentityPersistence(format!("Failed to store identity in keyring: {}", e))
            })
        })
        .await
        .map_err(|e| Error::Other(format!("Task join error: {}", e)))?
    }
}

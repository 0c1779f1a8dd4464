//! In-memory identity store

use crate::domain::identity::IdentityStore;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Identity store that forgets everything when the process exits
///
/// Useful for tests and for deployments that deliberately run with a
/// per-process identity.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    value: Mutex<Option<Vec<u8>>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the stored value
    pub fn clear(&self) {
        *self.value.lock() = None;
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.value.lock().clone())
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        *self.value.lock() = Some(bytes.to_vec());
        Ok(())
    }
}

//! Identity persistence trait
//!
//! The store is an external collaborator. Implementations live in
//! `infrastructure::identity`.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value store holding the persisted identity bytes
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the persisted identity, `None` if nothing was ever saved
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Persist the identity
    async fn save(&self, bytes: &[u8]) -> Result<()>;
}

//! Identity provider
//!
//! Computes the client identity once, persists it through an
//! [`IdentityStore`], and serves the cached value afterwards. The provider
//! never fails its caller: when persistence is unavailable it keeps an
//! in-memory identity for the lifetime of the process and reports itself as
//! degraded.

use super::identity::Identity;
use super::source::{FingerprintSource, HostFingerprintSource};
use super::store::IdentityStore;
use crate::error::Error;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// How the current identity was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// Reused from the store
    Persisted,
    /// Derived from the fingerprint source on this run
    Computed,
    /// Random, because no fingerprint was available
    Ephemeral,
}

/// Identity plus how it was resolved
#[derive(Debug, Clone)]
pub struct IdentityResolution {
    pub identity: Identity,
    pub origin: IdentityOrigin,
    /// True when the identity lives only in memory
    pub degraded: bool,
}

pub struct IdentityProvider {
    source: Arc<dyn FingerprintSource>,
    store: Arc<dyn IdentityStore>,
    cache: Mutex<Option<IdentityResolution>>,
    degraded_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProvider")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl IdentityProvider {
    pub fn new(source: Arc<dyn FingerprintSource>, store: Arc<dyn IdentityStore>) -> Self {
        let (degraded_tx, _) = watch::channel(false);
        Self {
            source,
            store,
            cache: Mutex::new(None),
            degraded_tx,
        }
    }

    /// Provider deriving identity from this host
    pub fn for_host(store: Arc<dyn IdentityStore>) -> Self {
        Self::new(Arc::new(HostFingerprintSource::new()), store)
    }

    /// Get the client identity, computing and persisting it on first use
    pub async fn get_identity(&self) -> Identity {
        self.resolve().await.identity
    }

    /// Like [`get_identity`](Self::get_identity), but also reports provenance
    pub async fn resolve(&self) -> IdentityResolution {
        let mut cache = self.cache.lock().await;
        if let Some(resolution) = cache.as_ref() {
            return resolution.clone();
        }

        let resolution = self.load_or_compute().await;
        *cache = Some(resolution.clone());
        resolution
    }

    /// Force recomputation and re-persistence
    ///
    /// Intended for explicit operator action only.
    pub async fn regenerate(&self) -> IdentityResolution {
        let mut cache = self.cache.lock().await;
        let resolution = self.compute_and_persist().await;
        info!(identity = %resolution.identity, "Identity regenerated");
        *cache = Some(resolution.clone());
        resolution
    }

    /// Whether the provider is running on an unpersisted identity
    pub fn is_degraded(&self) -> bool {
        *self.degraded_tx.borrow()
    }

    /// Receive degraded-mode changes
    pub fn degraded_signal(&self) -> watch::Receiver<bool> {
        self.degraded_tx.subscribe()
    }

    async fn load_or_compute(&self) -> IdentityResolution {
        match self.store.load().await {
            Ok(Some(bytes)) => match parse_persisted(&bytes) {
                Some(identity) => {
                    debug!(identity = %identity, "Reusing persisted identity");
                    self.set_degraded(false);
                    return IdentityResolution {
                        identity,
                        origin: IdentityOrigin::Persisted,
                        degraded: false,
                    };
                }
                None => warn!("Persisted identity is malformed, recomputing"),
            },
            Ok(None) => debug!("No persisted identity, computing"),
            Err(e) => warn!(error = %e, "Failed to load persisted identity, recomputing"),
        }

        self.compute_and_persist().await
    }

    async fn compute_and_persist(&self) -> IdentityResolution {
        let identity = match self.source.components() {
            Ok(components) if !components.is_empty() => Identity::from_fingerprint(&components),
            Ok(_) => return self.ephemeral("fingerprint source returned no components"),
            Err(e) => return self.ephemeral(&e.to_string()),
        };

        match self.store.save(identity.as_str().as_bytes()).await {
            Ok(()) => {
                info!(identity = %identity, "Identity computed and persisted");
                self.set_degraded(false);
                IdentityResolution {
                    identity,
                    origin: IdentityOrigin::Computed,
                    degraded: false,
                }
            }
            Err(e) => {
                let err = Error::IdentityPersistence(e.to_string());
                warn!(code = err.code(), error = %err, identity = %identity, "Identity degraded to in-memory");
                self.set_degraded(true);
                IdentityResolution {
                    identity,
                    origin: IdentityOrigin::Computed,
                    degraded: true,
                }
            }
        }
    }

    fn ephemeral(&self, reason: &str) -> IdentityResolution {
        let identity = Identity::ephemeral();
        warn!(reason = %reason, identity = %identity, "No stable fingerprint, using ephemeral identity");
        self.set_degraded(true);
        IdentityResolution {
            identity,
            origin: IdentityOrigin::Ephemeral,
            degraded: true,
        }
    }

    fn set_degraded(&self, degraded: bool) {
        self.degraded_tx.send_if_modified(|current| {
            let changed = *current != degraded;
            *current = degraded;
            changed
        });
    }
}

fn parse_persisted(bytes: &[u8]) -> Option<Identity> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    Identity::parse(text)
        .ok()
        .filter(Identity::is_generated_form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::source::StaticFingerprintSource;
    use crate::error::Result;
    use crate::infrastructure::identity::InMemoryIdentityStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixed_source() -> Arc<dyn FingerprintSource> {
        Arc::new(StaticFingerprintSource(vec![
            "machine-1".to_string(),
            "host-1".to_string(),
        ]))
    }

    struct BrokenStore {
        saves: AtomicUsize,
    }

    #[async_trait]
    impl IdentityStore for BrokenStore {
        async fn load(&self) -> Result<Option<Vec<u8>>> {
            Err(Error::Other("store offline".to_string()))
        }

        async fn save(&self, _bytes: &[u8]) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Err(Error::Other("read-only filesystem".to_string()))
        }
    }

    struct NoFingerprint;

    impl FingerprintSource for NoFingerprint {
        fn components(&self) -> Result<Vec<String>> {
            Err(Error::Other("sandboxed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_call_computes_and_persists() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let provider = IdentityProvider::new(fixed_source(), store.clone());

        let resolution = provider.resolve().await;
        assert_eq!(resolution.origin, IdentityOrigin::Computed);
        assert!(!resolution.degraded);

        let saved = store.load().await.unwrap().expect("nothing persisted");
        assert_eq!(saved, resolution.identity.as_str().as_bytes());
    }

    #[tokio::test]
    async fn test_get_identity_is_cached() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let provider = IdentityProvider::new(fixed_source(), store.clone());

        let first = provider.get_identity().await;
        store.clear();
        let second = provider.get_identity().await;

        assert_eq!(first, second);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persisted_value_survives_restart() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let persisted = Identity::from_fingerprint(&["some-other-machine".to_string()]);
        store.save(persisted.as_str().as_bytes()).await.unwrap();

        let provider = IdentityProvider::new(fixed_source(), store);
        let resolution = provider.resolve().await;

        assert_eq!(resolution.origin, IdentityOrigin::Persisted);
        assert_eq!(resolution.identity, persisted);
    }

    #[tokio::test]
    async fn test_malformed_persisted_value_is_recomputed() {
        let store = Arc::new(InMemoryIdentityStore::new());
        store.save(b"not an identity!").await.unwrap();

        let provider = IdentityProvider::new(fixed_source(), store.clone());
        let resolution = provider.resolve().await;

        assert_eq!(resolution.origin, IdentityOrigin::Computed);
        assert!(resolution.identity.is_generated_form());
        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved, resolution.identity.as_str().as_bytes());
    }

    #[tokio::test]
    async fn test_persistence_failure_degrades_without_failing() {
        let store = Arc::new(BrokenStore {
            saves: AtomicUsize::new(0),
        });
        let provider = IdentityProvider::new(fixed_source(), store.clone());
        let signal = provider.degraded_signal();

        let resolution = provider.resolve().await;
        assert!(resolution.degraded);
        assert!(provider.is_degraded());
        assert!(*signal.borrow());

        let again = provider.get_identity().await;
        assert_eq!(again, resolution.identity);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_fingerprint_uses_ephemeral_identity() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let provider = IdentityProvider::new(Arc::new(NoFingerprint), store.clone());

        let resolution = provider.resolve().await;
        assert_eq!(resolution.origin, IdentityOrigin::Ephemeral);
        assert!(resolution.degraded);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_replaces_persisted_value() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let stale = Identity::from_fingerprint(&["old-board".to_string()]);
        store.save(stale.as_str().as_bytes()).await.unwrap();

        let provider = IdentityProvider::new(fixed_source(), store.clone());
        assert_eq!(provider.get_identity().await, stale);

        let fresh = provider.regenerate().await;
        assert_ne!(fresh.identity, stale);
        assert_eq!(provider.get_identity().await, fresh.identity);
        assert_eq!(
            store.load().await.unwrap().unwrap(),
            fresh.identity.as_str().as_bytes()
        );
    }
}

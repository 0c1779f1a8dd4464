//! File-backed identity store

use crate::config::Config;
use crate::domain::identity::IdentityStore;
use crate::error::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File name of the identity cache inside the config directory
const IDENTITY_FILE: &str = "identity";

/// Stores the identity as a single line of text
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the Bargein config directory
    pub fn at_default_location() -> anyhow::Result<Self> {
        Ok(Self::new(Config::config_dir()?.join(IDENTITY_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        // Write-then-rename so a crash never leaves a truncated identity
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = FileIdentityStore::new(temp.path().join("identity"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_roundtrips() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = FileIdentityStore::new(temp.path().join("a").join("b").join("identity"));

        store.save(b"0123456789abcdef").await.unwrap();
        assert_eq!(
            store.load().await.unwrap(),
            Some(b"0123456789abcdef".to_vec())
        );
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_save_into_file_path_fails() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let store = FileIdentityStore::new(blocker.join("identity"));
        assert!(store.save(b"abc").await.is_err());
    }
}

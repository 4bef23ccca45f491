//! Config persistence boundary.
//!
//! Load-or-default and save operations on the wrapper config record. Saves are
//! full-file replaces (write temp, rename) so a crash between an
//! authentication success and the persist never leaves a half-written file for
//! the next restore attempt to read.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::types::{Error, Result, WrapperConfig};

/// Persistence collaborator for the wrapper config.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the config, creating and persisting the defaulted record on first
    /// run.
    async fn load_or_default(&self) -> Result<WrapperConfig>;

    /// Persist the config atomically. Callable repeatedly.
    async fn save(&self, config: &WrapperConfig) -> Result<()>;
}

/// JSON file-backed config store.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load_or_default(&self) -> Result<WrapperConfig> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let config: WrapperConfig = serde_json::from_slice(&bytes)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = WrapperConfig::default();
                tracing::info!(
                    "config file {} not found, writing defaults",
                    self.path.display()
                );
                self.save(&config).await?;
                Ok(config)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn save(&self, config: &WrapperConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SavedCredential;
    use uuid::Uuid;

    fn store_in(dir: &tempfile::TempDir) -> JsonConfigStore {
        JsonConfigStore::new(dir.path().join("hostwrap.json"))
    }

    #[tokio::test]
    async fn test_first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let config = store.load_or_default().await.unwrap();
        assert!(config.save_session);
        // The defaulted record must now exist on disk.
        assert!(store.path().exists());

        let reloaded = store.load_or_default().await.unwrap();
        assert_eq!(reloaded.server_name, config.server_name);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut config = WrapperConfig::default();
        config.server_name = "lobby-1".to_string();
        config.saved = SavedCredential::RawSession {
            token: Uuid::new_v4(),
        };
        store.save(&config).await.unwrap();

        let loaded = store.load_or_default().await.unwrap();
        assert_eq!(loaded.server_name, "lobby-1");
        assert_eq!(loaded.saved, config.saved);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&WrapperConfig::default()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "hostwrap.json");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_not_a_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"{ not json").unwrap();

        // Silently replacing a corrupt config would lose credentials.
        assert!(store.load_or_default().await.is_err());
    }
}

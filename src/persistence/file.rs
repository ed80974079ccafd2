use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{fs, sync::RwLock};

use super::KeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Whole-file JSON backend: every entry lives in one object that is
/// rewritten on each change.
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let data = match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("ignoring unreadable store file {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read store from {}", path.display()))
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .await
            .with_context(|| format!("failed to write store to {}", self.path.display()))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut guard = self.data.write().await;
        guard.insert(key.to_string(), value);
        self.persist(&guard).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.data.write().await;
        if guard.remove(key).is_some() {
            self.persist(&guard).await?;
        }
        Ok(())
    }
}

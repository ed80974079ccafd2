//! Durable mirror of the store. The core only sees the [`KeyValueStore`]
//! trait; backends live in `db` (SQLite), [`file`] and [`memory`].

pub mod file;
pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

pub const GROUPS_KEY: &str = "groups";
pub const SETTINGS_KEY: &str = "settings";
pub const USER_KEY: &str = "user";
pub const LAST_GROUP_KEY: &str = "lastGroupId";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub async fn get_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .with_context(|| format!("stored value under '{key}' is not valid")),
        None => Ok(None),
    }
}

pub async fn set_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize value for '{key}'"))?;
    store.set(key, raw).await
}

pub mod channels;
pub mod config;
pub mod db;
pub mod models;
pub mod persistence;
pub mod reachability;
pub mod remote;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

pub use config::{EngineConfig, StorageBackend};
pub use utils::init_logging;

use db::Database;
use persistence::{JsonFileStore, KeyValueStore};
use reachability::{NetworkCheck, NetworkEvent, ReachabilityProber};
use remote::HttpGateway;
use store::LocalStore;

const DATABASE_FILE: &str = "tabhome.sqlite3";
const JSON_STORE_FILE: &str = "tabhome.json";

/// A running sync core: the store the UI talks to and the prober that keeps
/// internal URLs resolved.
pub struct App {
    pub store: LocalStore,
    pub prober: ReachabilityProber,
    watcher: CancellationToken,
}

impl App {
    pub async fn handle_network_event(&self, event: NetworkEvent) -> bool {
        self.prober.handle_network_event(event).await
    }

    /// Stop following the store and drain queued writes. Pending pushes that
    /// have not fired yet are dropped.
    pub async fn shutdown(self) {
        self.watcher.cancel();
        self.store.scheduler().cancel_all();
        self.store.flush().await;
        log::info!("tabhome core stopped");
    }
}

/// Open the local mirror under `data_dir`, restore and reconcile the store,
/// and start reachability probing. Fails only when local storage or the
/// HTTP clients cannot be set up.
pub async fn launch(data_dir: &Path, config: EngineConfig) -> Result<App> {
    init_logging();
    log::info!("tabhome core starting up...");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let kv = open_storage(data_dir, config.storage).await?;

    let gateway = Arc::new(HttpGateway::new(&config.api_base_url)?);
    let store = LocalStore::new(kv, gateway, &config);
    let report = store.restore().await;
    if !report.skipped.is_empty() {
        log::warn!("startup reconciliation skipped {:?}", report.skipped);
    }

    let check = Arc::new(NetworkCheck::new(config.probe_timeout)?);
    let prober = ReachabilityProber::new(check, &config);
    let watcher = prober.watch_store(store.subscribe());

    Ok(App {
        store,
        prober,
        watcher,
    })
}

async fn open_storage(data_dir: &Path, backend: StorageBackend) -> Result<Arc<dyn KeyValueStore>> {
    match backend {
        StorageBackend::Sqlite => {
            let db_path = data_dir.join(DATABASE_FILE);
            let database = tokio::task::spawn_blocking(move || Database::open(db_path))
                .await
                .context("database open task panicked")??;
            Ok(Arc::new(database))
        }
        StorageBackend::JsonFile => {
            let store = JsonFileStore::open(data_dir.join(JSON_STORE_FILE)).await?;
            Ok(Arc::new(store))
        }
    }
}

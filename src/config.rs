use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.tabhome.app/v1";

/// Where the local mirror lives under the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// `tabhome.sqlite3`
    Sqlite,
    /// `tabhome.json`, one pretty-printed object.
    JsonFile,
}

impl StorageBackend {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(StorageBackend::Sqlite),
            "json" | "file" => Some(StorageBackend::JsonFile),
            _ => None,
        }
    }
}

/// Timing and endpoint knobs for the sync core.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quiet period a channel must see before its latest state is pushed.
    pub sync_debounce: Duration,

    /// Maximum number of reachability checks in flight at once.
    pub probe_concurrency: usize,

    /// Time limit for a single reachability check, both stages included.
    pub probe_timeout: Duration,

    pub api_base_url: String,

    pub storage: StorageBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_debounce: Duration::from_millis(1000),
            probe_concurrency: 5,
            probe_timeout: Duration::from_millis(2000),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageBackend::Sqlite,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TABHOME_*` environment variables. Unparsable
    /// values are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let number = |name: &str| var(name)?.trim().parse::<u64>().ok();

        if let Some(url) = var("TABHOME_API_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(ms) = number("TABHOME_SYNC_DEBOUNCE_MS") {
            config.sync_debounce = Duration::from_millis(ms);
        }
        if let Some(n) = number("TABHOME_PROBE_CONCURRENCY") {
            config.probe_concurrency = (n as usize).max(1);
        }
        if let Some(ms) = number("TABHOME_PROBE_TIMEOUT_MS") {
            config.probe_timeout = Duration::from_millis(ms);
        }
        if let Some(storage) = var("TABHOME_STORAGE").and_then(|name| StorageBackend::from_name(&name)) {
            config.storage = storage;
        }

        config
    }
}

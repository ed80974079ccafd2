pub mod persister;
pub mod state;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::watch;

use crate::channels::{classify, classify_bookmark_edit, encode_channel, ChannelId};
use crate::config::EngineConfig;
use crate::models::{
    BookmarkGroup, BookmarkSite, GroupInput, Settings, SettingsPatch, SiteInput, UserSession,
};
use crate::persistence::{
    get_json, KeyValueStore, GROUPS_KEY, LAST_GROUP_KEY, SETTINGS_KEY, USER_KEY,
};
use crate::remote::RemoteGateway;
use crate::sync::{merge_remote, ChannelSnapshot, ReconcileReport, ReconciliationEngine, SyncScheduler};

pub use persister::Persister;
pub use state::StoreState;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// The single writer for groups, settings and the session. Every UI change
/// goes through here; readers use [`LocalStore::snapshot`] or
/// [`LocalStore::subscribe`].
///
/// In-memory state changes synchronously. Persistence and remote pushes are
/// queued and complete later, so this type must live inside a tokio runtime.
#[derive(Clone)]
pub struct LocalStore {
    state: Arc<watch::Sender<StoreState>>,
    kv: Arc<dyn KeyValueStore>,
    persister: Persister,
    gateway: Arc<dyn RemoteGateway>,
    scheduler: SyncScheduler,
    reconciler: ReconciliationEngine,
}

impl LocalStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn RemoteGateway>,
        config: &EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            state: Arc::new(state),
            persister: Persister::spawn(kv.clone()),
            kv,
            scheduler: SyncScheduler::new(gateway.clone(), config.sync_debounce),
            reconciler: ReconciliationEngine::new(gateway.clone()),
            gateway,
        }
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn is_logged_in(&self) -> bool {
        self.read(|state| state.session_secret().is_some())
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// Load the persisted mirror into memory, then reconcile with the server
    /// when a session was restored. Unreadable entries fall back to defaults.
    pub async fn restore(&self) -> ReconcileReport {
        let groups = match get_json::<Vec<BookmarkGroup>>(self.kv.as_ref(), GROUPS_KEY).await {
            Ok(Some(groups)) if !groups.is_empty() => Some(groups),
            Ok(_) => None,
            Err(err) => {
                log_warn!("stored groups unreadable, using defaults: {err:#}");
                None
            }
        };

        let settings = match get_json::<Value>(self.kv.as_ref(), SETTINGS_KEY).await {
            Ok(Some(value)) => Settings::from_value_lenient(value),
            Ok(None) => Settings::default(),
            Err(err) => {
                log_warn!("stored settings unreadable, using defaults: {err:#}");
                Settings::default()
            }
        };

        let session = match get_json::<UserSession>(self.kv.as_ref(), USER_KEY).await {
            Ok(session) => session.filter(UserSession::is_active),
            Err(err) => {
                log_warn!("stored session unreadable, staying logged out: {err:#}");
                None
            }
        };

        let last_group = if settings.remember_last_group {
            get_json::<String>(self.kv.as_ref(), LAST_GROUP_KEY)
                .await
                .unwrap_or_else(|err| {
                    log_warn!("stored last group unreadable: {err:#}");
                    None
                })
        } else {
            None
        };

        self.state.send_modify(|state| {
            if let Some(groups) = groups {
                state.groups = groups;
            }
            state.active_group_id = last_group;
            state.settings = settings;
            state.session = session;
            state.heal_active_group();
        });

        log_info!(
            "restored {} groups (logged in: {})",
            self.read(|state| state.groups.len()),
            self.is_logged_in()
        );

        self.reconcile().await
    }

    /// Pull every channel and merge it in, then mirror the result locally.
    /// A no-op without a session.
    pub async fn reconcile(&self) -> ReconcileReport {
        let Some(secret) = self.read(|state| state.session_secret().map(str::to_string)) else {
            return ReconcileReport::default();
        };

        let pull = self.reconciler.pull(&secret).await;

        let mut report = None;
        self.state.send_if_modified(|state| {
            // The user may have logged out while the fetches were running.
            if state.session_secret() != Some(secret.as_str()) {
                return false;
            }
            let before = state.clone();
            report = Some(merge_remote(state, &pull));
            self.persister.write(GROUPS_KEY, &state.groups);
            self.persister.write(SETTINGS_KEY, &state.settings);
            *state != before
        });

        let Some(report) = report else {
            log_warn!("session changed during reconciliation; result discarded");
            return ReconcileReport::default();
        };

        log_info!(
            "reconciled channels {:?}, skipped {:?}",
            report.applied,
            report.skipped
        );
        report
    }

    pub fn add_group(&self, input: GroupInput) -> String {
        let mut id = String::new();
        self.mutate_groups(|state| {
            id = state.add_group(input);
            true
        });
        id
    }

    pub fn update_group(&self, group_id: &str, input: GroupInput) -> bool {
        self.mutate_groups(|state| state.update_group(group_id, input))
    }

    pub fn delete_group(&self, group_id: &str) -> bool {
        self.mutate_groups(|state| state.delete_group(group_id))
    }

    pub fn add_site(&self, group_id: &str, input: SiteInput) -> Option<String> {
        let mut id = None;
        self.mutate_groups(|state| {
            id = state.add_site(group_id, input);
            id.is_some()
        });
        id
    }

    pub fn update_site(&self, group_id: &str, site: BookmarkSite) -> bool {
        self.mutate_groups(|state| state.update_site(group_id, site))
    }

    pub fn delete_site(&self, group_id: &str, site_id: &str) -> bool {
        self.mutate_groups(|state| state.delete_site(group_id, site_id))
    }

    pub fn reorder_site(&self, group_id: &str, site_id: &str, to_index: usize) -> bool {
        self.mutate_groups(|state| state.reorder_site(group_id, site_id, to_index))
    }

    pub fn move_site(
        &self,
        from_group: &str,
        site_id: &str,
        to_group: &str,
        to_index: Option<usize>,
    ) -> bool {
        self.mutate_groups(|state| state.move_site(from_group, site_id, to_group, to_index))
    }

    /// Switch groups. With "remember last group" on, the choice is persisted
    /// on its own key so it survives restarts even when logged out.
    pub fn set_active_group(&self, group_id: &str) -> bool {
        self.state.send_if_modified(|state| {
            let changed = state.set_active_group(group_id);
            if changed && state.settings.remember_last_group {
                self.persister.write(LAST_GROUP_KEY, group_id);
            }
            changed
        })
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        self.mutate_settings(|current| match current.with_fields(patch.fields()) {
            Ok(next) => Some(next),
            Err(err) => {
                log_warn!("rejected settings patch: {err:#}");
                None
            }
        })
    }

    pub fn replace_settings(&self, settings: Settings) -> bool {
        self.mutate_settings(|_| Some(settings))
    }

    /// Install a session without contacting the server.
    pub fn set_session(&self, session: UserSession) {
        self.state.send_modify(|state| {
            self.persister.write(USER_KEY, &session);
            state.session = Some(session);
        });
    }

    /// Store the session and pull the account's state once.
    pub async fn login(&self, session: UserSession) -> ReconcileReport {
        log_info!("logged in as {}", session.email);
        self.set_session(session);
        self.reconcile().await
    }

    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<ReconcileReport> {
        let session = self.gateway.login(email, password).await?;
        Ok(self.login(session).await)
    }

    /// Forget everything account-specific: the session, pending pushes, the
    /// stored groups and last group. Bookmarks go back to the built-in set.
    pub fn logout(&self) {
        self.scheduler.cancel_all();
        self.state.send_modify(|state| {
            state.session = None;
            state.reset_to_defaults();
            self.persister.remove(USER_KEY);
            self.persister.remove(GROUPS_KEY);
            self.persister.remove(LAST_GROUP_KEY);
        });
        log_info!("logged out; bookmarks reset to defaults");
    }

    /// Wait until every queued persistence write has reached the backend.
    pub async fn flush(&self) {
        self.persister.flush().await;
    }

    /// Apply a group edit. The new list is queued for persistence while the
    /// watch lock is still held, so queued writes follow mutation order.
    fn mutate_groups(&self, f: impl FnOnce(&mut StoreState) -> bool) -> bool {
        let changed = self.state.send_if_modified(|state| {
            let changed = f(state);
            if changed {
                self.persister.write(GROUPS_KEY, &state.groups);
            }
            changed
        });
        if changed {
            self.schedule_sync(classify_bookmark_edit());
        }
        changed
    }

    fn mutate_settings(&self, f: impl FnOnce(&Settings) -> Option<Settings>) -> bool {
        let mut changed_fields = Vec::new();
        self.state.send_if_modified(|state| {
            let Some(next) = f(&state.settings) else {
                return false;
            };
            changed_fields = state.settings.changed_fields(&next);
            if changed_fields.is_empty() {
                return false;
            }
            self.persister.write(SETTINGS_KEY, &next);
            state.settings = next;
            true
        });
        if changed_fields.is_empty() {
            return false;
        }

        self.schedule_sync(classify(changed_fields.iter().map(String::as_str)));
        true
    }

    fn schedule_sync(&self, channels: BTreeSet<ChannelId>) {
        if !self.is_logged_in() {
            return;
        }
        for channel in channels {
            let state = self.state.clone();
            self.scheduler.schedule(channel, move || {
                let state = state.borrow();
                let secret = state.session_secret()?.to_string();
                match encode_channel(channel, &state.groups, &state.settings) {
                    Ok(payload) => Some(ChannelSnapshot { secret, payload }),
                    Err(err) => {
                        log_error!("could not encode {channel} for push: {err:#}");
                        None
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::{SettingsField, Theme};
    use crate::persistence::MemoryStore;
    use crate::test_support::{sample_session, RecordingGateway};
    use std::time::Duration;

    struct Harness {
        store: LocalStore,
        kv: Arc<MemoryStore>,
        gateway: Arc<RecordingGateway>,
    }

    fn harness() -> Harness {
        let kv = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let store = LocalStore::new(kv.clone(), gateway.clone(), &EngineConfig::default());
        Harness { store, kv, gateway }
    }

    fn home_with_one_site(store: &LocalStore) -> String {
        let home = store.add_group(GroupInput {
            name: "Home".into(),
            icon: "home".into(),
        });
        let ids: Vec<_> = store.read(|s| s.groups.iter().map(|g| g.id.clone()).collect());
        for id in ids.into_iter().filter(|id| *id != home) {
            store.delete_group(&id);
        }
        store.add_site(
            &home,
            SiteInput {
                name: "Mail".into(),
                url: "https://mail.example.com".into(),
                ..Default::default()
            },
        );
        home
    }

    #[tokio::test(start_paused = true)]
    async fn edits_across_channels_push_once_each() {
        let h = harness();
        h.store.set_session(sample_session());
        let home = home_with_one_site(&h.store);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        h.gateway.clear_pushes();

        h.store.add_site(
            &home,
            SiteInput {
                name: "Calendar".into(),
                url: "https://calendar.example.com".into(),
                ..Default::default()
            },
        );
        tokio::time::sleep(Duration::from_millis(400)).await;
        h.store
            .update_settings(SettingsPatch::new().set(SettingsField::Theme, Theme::Light));

        let state = h.store.snapshot();
        assert_eq!(state.group(&home).unwrap().sites.len(), 2);
        assert_eq!(state.settings.theme, Theme::Light);
        assert!(h.gateway.pushes().is_empty());

        tokio::time::sleep(Duration::from_millis(1200)).await;

        let grid = h.gateway.pushes_for(ChannelId::IconGrid);
        assert_eq!(grid.len(), 1);
        let grid: Value = serde_json::from_str(&grid[0]).unwrap();
        assert_eq!(grid["groups"][0]["sites"].as_array().unwrap().len(), 2);

        let common = h.gateway.pushes_for(ChannelId::Common);
        assert_eq!(common.len(), 1);
        let common: Value = serde_json::from_str(&common[0]).unwrap();
        assert_eq!(common["theme"], "light");
        assert!(common.get("groups").is_none());
        assert_eq!(h.gateway.pushes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_settings_edits_push_the_last_value() {
        let h = harness();
        h.store.set_session(sample_session());

        for size in [40u32, 48, 56, 72] {
            h.store
                .update_settings(SettingsPatch::new().set(SettingsField::IconSize, size));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let pushes = h.gateway.pushes_for(ChannelId::IconGrid);
        assert_eq!(pushes.len(), 1);
        let payload: Value = serde_json::from_str(&pushes[0]).unwrap();
        assert_eq!(payload["settings"]["iconSize"], 72);
        assert!(payload["settings"].get("theme").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn logged_out_edits_persist_but_never_push() {
        let h = harness();
        h.store
            .update_settings(SettingsPatch::new().set(SettingsField::StandbyBlur, 3));
        h.store.add_group(GroupInput {
            name: "Local".into(),
            icon: String::new(),
        });
        tokio::time::sleep(Duration::from_millis(2000)).await;
        h.store.flush().await;

        assert_eq!(h.gateway.push_attempts(), 0);
        let stored: Value =
            serde_json::from_str(&h.kv.get(SETTINGS_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored["standbyBlur"], 3);
        assert!(h.kv.contains(GROUPS_KEY));
    }

    #[tokio::test]
    async fn unchanged_or_invalid_patches_are_ignored() {
        let h = harness();
        let rx = h.store.subscribe();
        assert!(!h
            .store
            .update_settings(SettingsPatch::new().set(SettingsField::Theme, Theme::System)));
        assert!(!h
            .store
            .update_settings(SettingsPatch::from_json(serde_json::json!({ "iconSize": -1 }))));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn stored_groups_match_memory_after_concurrent_edits() {
        let h = harness();

        let mut writers = tokio::task::JoinSet::new();
        for writer in 0..8 {
            let store = h.store.clone();
            writers.spawn(async move {
                for n in 0..50 {
                    store.add_group(GroupInput {
                        name: format!("w{writer}-{n}"),
                        icon: String::new(),
                    });
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap();
        }
        h.store.flush().await;

        let stored: Vec<BookmarkGroup> =
            serde_json::from_str(&h.kv.get(GROUPS_KEY).await.unwrap().unwrap()).unwrap();
        let memory = h.store.snapshot().groups;
        assert_eq!(memory.len(), 2 + 8 * 50);
        assert_eq!(stored, memory);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stored_settings_match_memory_after_concurrent_edits() {
        let h = harness();

        let mut writers = tokio::task::JoinSet::new();
        for writer in 0..4u32 {
            let store = h.store.clone();
            writers.spawn(async move {
                for n in 0..50u32 {
                    store.update_settings(
                        SettingsPatch::new().set(SettingsField::IconSize, 100 + writer * 50 + n),
                    );
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap();
        }
        h.store.flush().await;

        let stored: Settings =
            serde_json::from_str(&h.kv.get(SETTINGS_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored, h.store.snapshot().settings);
    }

    #[tokio::test]
    async fn remembered_group_survives_restart() {
        let h = harness();
        assert!(h.store.set_active_group("default-tools"));
        h.store.flush().await;

        let restarted = LocalStore::new(h.kv.clone(), h.gateway.clone(), &EngineConfig::default());
        restarted.restore().await;
        assert_eq!(
            restarted.snapshot().active_group_id.as_deref(),
            Some("default-tools")
        );
    }

    #[tokio::test]
    async fn last_group_is_not_persisted_when_remembering_is_off() {
        let h = harness();
        h.store.update_settings(
            SettingsPatch::new().set(SettingsField::RememberLastGroup, false),
        );
        h.store.set_active_group("default-tools");
        h.store.flush().await;
        assert!(!h.kv.contains(LAST_GROUP_KEY));
    }

    #[tokio::test]
    async fn login_reconciles_and_mirrors_the_result() {
        let h = harness();
        h.gateway.set_remote(ChannelId::Common, r#"{"theme":"dark"}"#);
        h.gateway.set_remote(
            ChannelId::IconGrid,
            r#"{"groups":[{"id":"srv","name":"Server","sites":[]}],"settings":{}}"#,
        );

        let report = h.store.login(sample_session()).await;
        h.store.flush().await;

        assert!(report.groups_replaced);
        let state = h.store.snapshot();
        assert_eq!(state.settings.theme, Theme::Dark);
        assert_eq!(state.active_group_id.as_deref(), Some("srv"));

        let stored: Vec<BookmarkGroup> =
            serde_json::from_str(&h.kv.get(GROUPS_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored, state.groups);
        assert!(h.kv.contains(USER_KEY));
    }

    #[tokio::test]
    async fn login_with_bad_password_leaves_store_untouched() {
        let h = harness();
        assert!(h.store.login_with_password("me@example.com", "wrong").await.is_err());
        assert!(!h.store.is_logged_in());

        h.store
            .login_with_password("me@example.com", "hunter2")
            .await
            .unwrap();
        assert!(h.store.is_logged_in());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_restores_defaults_and_forgets_account_keys() {
        let h = harness();
        h.gateway.set_remote(
            ChannelId::IconGrid,
            r#"{"groups":[{"id":"srv","name":"Server","sites":[]}]}"#,
        );
        h.store.login(sample_session()).await;
        h.store.set_active_group("srv");
        h.store.add_group(GroupInput {
            name: "Pending".into(),
            icon: String::new(),
        });

        h.store.logout();
        h.store.flush().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;

        let state = h.store.snapshot();
        assert_eq!(state, StoreState {
            settings: state.settings.clone(),
            ..StoreState::default()
        });
        assert!(!h.kv.contains(USER_KEY));
        assert!(!h.kv.contains(GROUPS_KEY));
        assert!(!h.kv.contains(LAST_GROUP_KEY));
        assert_eq!(h.gateway.push_attempts(), 0);
    }

    #[tokio::test]
    async fn restore_completes_partial_settings_and_skips_bad_groups() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(SETTINGS_KEY, r#"{"theme":"light"}"#.into()).await.unwrap();
        kv.set(GROUPS_KEY, "not json".into()).await.unwrap();
        let gateway = Arc::new(RecordingGateway::default());

        let store = LocalStore::new(kv, gateway.clone(), &EngineConfig::default());
        let report = store.restore().await;

        let state = store.snapshot();
        assert_eq!(state.settings.theme, Theme::Light);
        assert_eq!(state.settings.icon_size, Settings::default().icon_size);
        assert_eq!(state.groups, StoreState::default().groups);
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(gateway.fetch_count(), 0);
    }

    #[tokio::test]
    async fn restored_session_triggers_reconciliation() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(USER_KEY, serde_json::to_string(&sample_session()).unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        gateway.set_remote(ChannelId::Standby, r#"{"standbyEnabled":false}"#);

        let store = LocalStore::new(kv, gateway.clone(), &EngineConfig::default());
        let report = store.restore().await;

        assert!(store.is_logged_in());
        assert_eq!(report.applied, vec![ChannelId::Standby]);
        assert!(!store.snapshot().settings.standby_enabled);
        assert_eq!(gateway.fetch_count(), ChannelId::COUNT);
    }
}

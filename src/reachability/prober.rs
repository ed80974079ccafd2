use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::models::{BookmarkGroup, BookmarkSite};
use crate::store::StoreState;

use super::check::ReachabilityCheck;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Site ids are only unique inside their group, so the group is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub group_id: String,
    pub site_id: String,
}

impl SiteKey {
    pub fn new(group_id: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            site_id: site_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Idle,
    Probing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    ConnectionChanged,
}

/// Outcome of one probe. `url` is the internal URL that was checked, so an
/// edit made after the cycle never inherits the old verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub reachable: bool,
}

pub type ReachabilityCache = HashMap<SiteKey, ProbeResult>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    key: SiteKey,
    url: String,
}

struct Inner {
    check: Arc<dyn ReachabilityCheck>,
    concurrency: usize,
    timeout: Duration,
    probing: AtomicBool,
    groups: RwLock<Vec<BookmarkGroup>>,
    cache: RwLock<Arc<ReachabilityCache>>,
}

/// Decides, per bookmark, whether its internal URL should be preferred.
#[derive(Clone)]
pub struct ReachabilityProber {
    inner: Arc<Inner>,
}

/// Holds the probing flag for the duration of a cycle.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReachabilityProber {
    pub fn new(check: Arc<dyn ReachabilityCheck>, config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                check,
                concurrency: config.probe_concurrency.max(1),
                timeout: config.probe_timeout,
                probing: AtomicBool::new(false),
                groups: RwLock::new(Vec::new()),
                cache: RwLock::new(Arc::new(ReachabilityCache::new())),
            }),
        }
    }

    /// Replace the bookmark list the next cycle probes. Does not start one.
    pub fn set_groups(&self, groups: Vec<BookmarkGroup>) {
        *self
            .inner
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner) = groups;
    }

    pub fn status(&self) -> ProbeStatus {
        if self.inner.probing.load(Ordering::Acquire) {
            ProbeStatus::Probing
        } else {
            ProbeStatus::Idle
        }
    }

    /// The cache as of the last completed cycle.
    pub fn snapshot(&self) -> Arc<ReachabilityCache> {
        self.inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The URL a click on `site` should open: its internal URL only when the
    /// last cycle confirmed that exact URL reachable.
    pub fn effective_url<'a>(&self, group_id: &str, site: &'a BookmarkSite) -> &'a str {
        let internal = match site.internal_url.as_deref() {
            Some(url) if site.has_internal_url() => url.trim(),
            _ => return &site.url,
        };

        let cache = self.snapshot();
        match cache.get(&SiteKey::new(group_id, site.id.as_str())) {
            Some(result) if result.reachable && result.url == internal => internal,
            _ => &site.url,
        }
    }

    pub async fn handle_network_event(&self, event: NetworkEvent) -> bool {
        log_debug!("network event {event:?}; reprobing internal URLs");
        self.run_cycle().await
    }

    /// Probe every site with an internal URL and swap in a fresh cache.
    /// Returns `false` without doing anything when a cycle is already running.
    pub async fn run_cycle(&self) -> bool {
        let Some(_guard) = CycleGuard::acquire(&self.inner.probing) else {
            log_debug!("probe cycle already running; trigger ignored");
            return false;
        };

        let candidates = {
            let groups = self
                .inner
                .groups
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            candidates(&groups)
        };
        let total = candidates.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));

        let mut workers = JoinSet::new();
        for _ in 0..self.inner.concurrency.min(total) {
            workers.spawn(probe_worker(
                queue.clone(),
                self.inner.check.clone(),
                self.inner.timeout,
            ));
        }

        let mut fresh = ReachabilityCache::with_capacity(total);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(results) => fresh.extend(results),
                Err(join_err) => log_error!("probe worker died: {join_err}"),
            }
        }

        let reachable = fresh.values().filter(|result| result.reachable).count();
        *self
            .inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(fresh);
        log_info!("probe cycle done: {reachable}/{total} internal URLs reachable");
        true
    }

    /// Follow the store: probe once now, then again whenever the set of
    /// internal URLs changes. Cancel the returned token to stop.
    pub fn watch_store(&self, mut states: watch::Receiver<StoreState>) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let prober = self.clone();

        tokio::spawn(async move {
            let groups = states.borrow_and_update().groups.clone();
            let initial = candidates(&groups);
            prober.set_groups(groups);
            let mut probed = Vec::new();
            if prober.run_cycle().await {
                probed = initial;
            }

            loop {
                tokio::select! {
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let groups = states.borrow_and_update().groups.clone();
                        let next = candidates(&groups);
                        prober.set_groups(groups);
                        if next == probed {
                            continue;
                        }
                        // A cycle already in flight may have read the old list;
                        // keep the change pending until one of ours runs.
                        if prober.run_cycle().await {
                            probed = next;
                        }
                    }
                    _ = cancel.cancelled() => {
                        log_info!("reachability watcher stopped");
                        break;
                    }
                }
            }
        });

        token
    }
}

fn candidates(groups: &[BookmarkGroup]) -> Vec<Candidate> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .sites
                .iter()
                .filter(|site| site.has_internal_url())
                .filter_map(move |site| {
                    Some(Candidate {
                        key: SiteKey::new(group.id.as_str(), site.id.as_str()),
                        url: site.internal_url.as_deref()?.trim().to_string(),
                    })
                })
        })
        .collect()
}

async fn probe_worker(
    queue: Arc<Mutex<VecDeque<Candidate>>>,
    check: Arc<dyn ReachabilityCheck>,
    timeout: Duration,
) -> Vec<(SiteKey, ProbeResult)> {
    let mut results = Vec::new();
    loop {
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some(Candidate { key, url }) = next else {
            break;
        };

        match tokio::time::timeout(timeout, check.check(&url)).await {
            Ok(Ok(reachable)) => results.push((key, ProbeResult { url, reachable })),
            Ok(Err(err)) => log_debug!("probe of {url} errored, left out: {err:#}"),
            Err(_) => {
                log_debug!("probe of {url} timed out");
                results.push((
                    key,
                    ProbeResult {
                        url,
                        reachable: false,
                    },
                ));
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteIcon;
    use crate::test_support::ScriptedCheck;

    fn site(id: &str, internal: Option<&str>) -> BookmarkSite {
        BookmarkSite {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            url: format!("https://{id}.example.com"),
            internal_url: internal.map(str::to_string),
            icon: SiteIcon::default(),
            background: String::new(),
            icon_scale: None,
        }
    }

    fn group(id: &str, sites: Vec<BookmarkSite>) -> BookmarkGroup {
        BookmarkGroup {
            id: id.into(),
            name: id.into(),
            icon: String::new(),
            sites,
        }
    }

    fn internal(n: usize) -> String {
        format!("http://10.0.0.{n}:8080")
    }

    fn twelve_sites() -> Vec<BookmarkGroup> {
        let site_for = |n: usize| site(&format!("s{n}"), Some(&internal(n)));
        vec![
            group("lab", (0..7).map(site_for).collect()),
            group("home", (7..12).map(site_for).chain([site("plain", None)]).collect()),
        ]
    }

    fn prober(check: &Arc<ScriptedCheck>) -> ReachabilityProber {
        ReachabilityProber::new(check.clone(), &EngineConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_stays_bounded_and_cache_is_complete() {
        let check = ScriptedCheck::with_delay(Duration::from_millis(300));
        for n in (0..12).step_by(2) {
            check.mark_reachable(&internal(n));
        }
        let prober = prober(&check);
        prober.set_groups(twelve_sites());

        assert!(prober.run_cycle().await);

        assert_eq!(check.peak_in_flight(), 5);
        assert_eq!(check.calls(), 12);
        let cache = prober.snapshot();
        assert_eq!(cache.len(), 12);
        assert!(cache[&SiteKey::new("lab", "s0")].reachable);
        assert!(!cache[&SiteKey::new("lab", "s1")].reachable);
        assert_eq!(prober.status(), ProbeStatus::Idle);
    }

    #[tokio::test]
    async fn effective_url_prefers_only_confirmed_internal_urls() {
        let check = Arc::new(ScriptedCheck::default());
        check.mark_reachable(&internal(0));
        check.mark_failing(&internal(2));
        let groups = vec![group(
            "lab",
            vec![
                site("s0", Some(&internal(0))),
                site("s1", Some(&internal(1))),
                site("s2", Some(&internal(2))),
                site("plain", None),
            ],
        )];
        let prober = prober(&check);
        prober.set_groups(groups.clone());
        let sites = &groups[0].sites;

        assert_eq!(prober.effective_url("lab", &sites[0]), sites[0].url);

        prober.run_cycle().await;
        assert_eq!(prober.effective_url("lab", &sites[0]), internal(0));
        assert_eq!(prober.effective_url("lab", &sites[1]), sites[1].url);
        assert_eq!(prober.effective_url("lab", &sites[2]), sites[2].url);
        assert_eq!(prober.effective_url("lab", &sites[3]), sites[3].url);
        // Same site id under another group is a different bookmark.
        assert_eq!(prober.effective_url("other", &sites[0]), sites[0].url);

        let cache = prober.snapshot();
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key(&SiteKey::new("lab", "s2")));
        assert_eq!(check.calls(), 3);
    }

    #[tokio::test]
    async fn edited_internal_url_is_not_trusted_until_reprobed() {
        let check = Arc::new(ScriptedCheck::default());
        check.mark_reachable(&internal(0));
        let prober = prober(&check);
        prober.set_groups(vec![group("lab", vec![site("s0", Some(&internal(0)))])]);
        prober.run_cycle().await;

        let edited = site("s0", Some(&internal(9)));
        assert_eq!(prober.effective_url("lab", &edited), edited.url);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_checks_time_out_as_unreachable() {
        let check = ScriptedCheck::with_delay(Duration::from_secs(10));
        check.mark_reachable(&internal(0));
        let prober = prober(&check);
        prober.set_groups(vec![group("lab", vec![site("s0", Some(&internal(0)))])]);

        prober.run_cycle().await;
        prober.run_cycle().await;

        assert_eq!(check.in_flight(), 0);
        assert_eq!(check.peak_in_flight(), 1);
        let cache = prober.snapshot();
        assert_eq!(
            cache[&SiteKey::new("lab", "s0")],
            ProbeResult {
                url: internal(0),
                reachable: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_a_cycle_are_ignored() {
        let check = ScriptedCheck::with_delay(Duration::from_millis(500));
        let prober = prober(&check);
        prober.set_groups(twelve_sites());

        let running = prober.clone();
        let cycle = tokio::spawn(async move { running.run_cycle().await });
        tokio::task::yield_now().await;

        assert_eq!(prober.status(), ProbeStatus::Probing);
        assert!(!prober.handle_network_event(NetworkEvent::Online).await);
        assert!(cycle.await.unwrap());

        assert_eq!(check.calls(), 12);
        assert_eq!(prober.status(), ProbeStatus::Idle);
        assert!(prober.handle_network_event(NetworkEvent::ConnectionChanged).await);
        assert_eq!(check.calls(), 24);
    }

    #[tokio::test(start_paused = true)]
    async fn url_added_during_a_busy_cycle_is_probed_on_the_next_change() {
        let check = ScriptedCheck::with_delay(Duration::from_millis(500));
        check.mark_reachable(&internal(1));
        let prober = prober(&check);

        let mut state = StoreState::default();
        state.groups = vec![group("lab", vec![site("s0", Some(&internal(0)))])];
        let (tx, rx) = watch::channel(state);
        let token = prober.watch_store(rx);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(check.calls(), 1);

        let busy = prober.clone();
        let network = tokio::spawn(async move {
            busy.handle_network_event(NetworkEvent::Online).await
        });
        tokio::task::yield_now().await;
        assert_eq!(prober.status(), ProbeStatus::Probing);

        tx.send_modify(|state| state.groups[0].sites.push(site("s1", Some(&internal(1)))));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(network.await.unwrap());
        assert!(!prober.snapshot().contains_key(&SiteKey::new("lab", "s1")));

        tx.send_modify(|state| state.groups[0].name = "Lab".into());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(prober.snapshot()[&SiteKey::new("lab", "s1")].reachable);
        token.cancel();
    }

    #[tokio::test]
    async fn empty_bookmark_list_yields_empty_cache() {
        let check = Arc::new(ScriptedCheck::default());
        let prober = prober(&check);
        prober.set_groups(vec![group("home", vec![site("plain", None)])]);

        assert!(prober.run_cycle().await);
        assert!(prober.snapshot().is_empty());
        assert_eq!(check.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_reprobes_only_when_internal_urls_change() {
        let check = Arc::new(ScriptedCheck::default());
        check.mark_reachable(&internal(0));
        let prober = prober(&check);

        let mut state = StoreState::default();
        state.groups = vec![group("lab", vec![site("s0", Some(&internal(0)))])];
        let (tx, rx) = watch::channel(state);
        let token = prober.watch_store(rx);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(check.calls(), 1);
        assert_eq!(prober.snapshot().len(), 1);

        tx.send_modify(|state| state.groups[0].name = "Renamed".into());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(check.calls(), 1);

        tx.send_modify(|state| state.groups[0].sites.push(site("s1", Some(&internal(1)))));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(check.calls(), 3);
        assert_eq!(prober.snapshot().len(), 2);

        token.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send_modify(|state| state.groups.clear());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(check.calls(), 3);
    }
}

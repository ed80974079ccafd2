//! Fakes shared by unit tests across modules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::channels::ChannelId;
use crate::models::UserSession;
use crate::reachability::ReachabilityCheck;
use crate::remote::RemoteGateway;

pub const TEST_PASSWORD: &str = "hunter2";

pub fn sample_session() -> UserSession {
    UserSession {
        email: "me@example.com".into(),
        name: "Me".into(),
        avatar: String::new(),
        secret: "s3cret".into(),
        logged_in: true,
        logged_in_at: Some(Utc::now()),
    }
}

/// In-memory server: serves canned channel payloads and records pushes.
#[derive(Default)]
pub struct RecordingGateway {
    remote: Mutex<HashMap<ChannelId, String>>,
    broken: Mutex<HashSet<ChannelId>>,
    pushes: Mutex<Vec<(ChannelId, String)>>,
    push_attempts: AtomicUsize,
    fetches: AtomicUsize,
    failing_pushes: AtomicBool,
}

impl RecordingGateway {
    pub fn set_remote(&self, channel: ChannelId, payload: &str) {
        self.remote
            .lock()
            .unwrap()
            .insert(channel, payload.to_string());
    }

    pub fn fail_fetch(&self, channel: ChannelId) {
        self.broken.lock().unwrap().insert(channel);
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.failing_pushes.store(fail, Ordering::SeqCst);
    }

    /// Successful pushes, in completion order.
    pub fn pushes(&self) -> Vec<(ChannelId, String)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushes_for(&self, channel: ChannelId) -> Vec<String> {
        self.pushes()
            .into_iter()
            .filter(|(pushed, _)| *pushed == channel)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn clear_pushes(&self) {
        self.pushes.lock().unwrap().clear();
    }

    pub fn push_attempts(&self) -> usize {
        self.push_attempts.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteGateway for RecordingGateway {
    async fn fetch_channel(&self, _secret: &str, channel: ChannelId) -> Result<Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.broken.lock().unwrap().contains(&channel) {
            bail!("connection reset fetching {channel}");
        }
        Ok(self.remote.lock().unwrap().get(&channel).cloned())
    }

    async fn push_channel(&self, _secret: &str, channel: ChannelId, payload: &str) -> Result<bool> {
        self.push_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_pushes.load(Ordering::SeqCst) {
            return Err(anyhow!("server unavailable"));
        }
        self.pushes
            .lock()
            .unwrap()
            .push((channel, payload.to_string()));
        Ok(true)
    }

    async fn login(&self, email: &str, password: &str) -> Result<UserSession> {
        if password != TEST_PASSWORD {
            bail!("invalid credentials");
        }
        Ok(UserSession {
            email: email.to_string(),
            ..sample_session()
        })
    }
}

/// Scripted reachability: hosts listed as reachable answer `true`, hosts
/// listed as failing return an error, everything else `false`. Tracks the
/// peak number of checks in flight.
#[derive(Default)]
pub struct ScriptedCheck {
    pub reachable: Mutex<HashSet<String>>,
    pub failing: Mutex<HashSet<String>>,
    pub delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedCheck {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let check = Self::default();
        *check.delay.lock().unwrap() = Some(delay);
        Arc::new(check)
    }

    pub fn mark_reachable(&self, url: &str) {
        self.reachable.lock().unwrap().insert(url.to_string());
    }

    pub fn mark_failing(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Releases an in-flight slot even when the check is cancelled by a timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityCheck for ScriptedCheck {
    async fn check(&self, url: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _slot = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(url) {
            bail!("probe of {url} failed");
        }
        Ok(self.reachable.lock().unwrap().contains(url))
    }
}

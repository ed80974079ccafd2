use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::channels::ChannelId;
use crate::remote::RemoteGateway;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// What a channel push sends, captured when the quiet period ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub secret: String,
    pub payload: String,
}

type TimerSlots = [Option<JoinHandle<()>>; ChannelId::COUNT];

/// Per-channel debounce in front of [`RemoteGateway::push_channel`].
#[derive(Clone)]
pub struct SyncScheduler {
    gateway: Arc<dyn RemoteGateway>,
    quiet_period: Duration,
    timers: Arc<Mutex<TimerSlots>>,
}

impl SyncScheduler {
    pub fn new(gateway: Arc<dyn RemoteGateway>, quiet_period: Duration) -> Self {
        Self {
            gateway,
            quiet_period,
            timers: Arc::new(Mutex::new(Default::default())),
        }
    }

    /// Restart `channel`'s quiet-period timer. When it expires `producer` is
    /// asked for the state to send; `None` skips the push.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, channel: ChannelId, producer: F)
    where
        F: FnOnce() -> Option<ChannelSnapshot> + Send + 'static,
    {
        let gateway = self.gateway.clone();
        let quiet_period = self.quiet_period;

        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timers[channel.index()].take() {
            previous.abort();
        }

        // The push runs as its own task so a later reschedule only ever
        // cancels the wait, never a request already on the wire.
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;

            let Some(snapshot) = producer() else {
                log_debug!("nothing to push for {channel}");
                return;
            };
            tokio::spawn(push(gateway, channel, snapshot));
        });
        timers[channel.index()] = Some(timer);
    }

    pub fn is_pending(&self, channel: ChannelId) -> bool {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers[channel.index()]
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Drop every waiting timer. Pushes already dispatched are left alone.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in timers.iter_mut() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
    }
}

async fn push(gateway: Arc<dyn RemoteGateway>, channel: ChannelId, snapshot: ChannelSnapshot) {
    match gateway
        .push_channel(&snapshot.secret, channel, &snapshot.payload)
        .await
    {
        Ok(true) => log_info!("pushed {channel} ({} bytes)", snapshot.payload.len()),
        Ok(false) => log_warn!("server refused {channel} push; dropped"),
        Err(err) => log_warn!("{channel} push failed, dropped: {err:#}"),
    }
}

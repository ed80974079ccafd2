use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinSet;

use crate::channels::{decode_channel, ChannelId, DecodedChannel};
use crate::remote::RemoteGateway;
use crate::store::StoreState;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

/// Channels that decoded cleanly, plus the ones that contributed nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePull {
    pub decoded: Vec<DecodedChannel>,
    pub skipped: Vec<ChannelId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: Vec<ChannelId>,
    pub skipped: Vec<ChannelId>,
    pub groups_replaced: bool,
}

/// Pulls every channel and folds the server's view into local state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    gateway: Arc<dyn RemoteGateway>,
}

impl ReconciliationEngine {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    /// Fetch and decode all channels concurrently. One channel failing never
    /// affects the others.
    pub async fn pull(&self, secret: &str) -> RemotePull {
        let mut tasks = JoinSet::new();
        for channel in ChannelId::ALL {
            let gateway = self.gateway.clone();
            let secret = secret.to_string();
            tasks.spawn(async move {
                let outcome = fetch_and_decode(gateway.as_ref(), &secret, channel).await;
                (channel, outcome)
            });
        }

        let mut pull = RemotePull::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((channel, Ok(Some(decoded)))) => {
                    log_debug!("remote {channel} decoded");
                    pull.decoded.push(decoded);
                }
                Ok((channel, Ok(None))) => {
                    log_debug!("server has no {channel} data yet");
                    pull.skipped.push(channel);
                }
                Ok((channel, Err(err))) => {
                    log_warn!("skipping {channel} during reconciliation: {err:#}");
                    pull.skipped.push(channel);
                }
                Err(join_err) => log_error!("reconciliation fetch task died: {join_err}"),
            }
        }

        pull.decoded.sort_by_key(|decoded| decoded.channel.index());
        pull.skipped.sort_by_key(|channel| channel.index());
        pull
    }
}

async fn fetch_and_decode(
    gateway: &dyn RemoteGateway,
    secret: &str,
    channel: ChannelId,
) -> Result<Option<DecodedChannel>> {
    match gateway.fetch_channel(secret, channel).await? {
        Some(raw) => decode_channel(channel, &raw).map(Some),
        None => Ok(None),
    }
}

/// Merge decoded channels into `state`. A bookmarks payload replaces the
/// group list only when it has at least one group; settings channels win
/// field by field over what is there.
pub fn merge_remote(state: &mut StoreState, pulled: &RemotePull) -> ReconcileReport {
    let mut report = ReconcileReport {
        skipped: pulled.skipped.clone(),
        ..ReconcileReport::default()
    };

    for decoded in &pulled.decoded {
        let next_settings = match state.settings.with_fields(&decoded.fields) {
            Ok(settings) => settings,
            Err(err) => {
                log_warn!("dropping {} settings: {err:#}", decoded.channel);
                report.skipped.push(decoded.channel);
                continue;
            }
        };
        state.settings = next_settings;

        if let Some(groups) = &decoded.groups {
            if groups.is_empty() {
                log_warn!("server returned no bookmark groups; keeping local groups");
            } else {
                state.replace_groups(groups.clone());
                report.groups_replaced = true;
            }
        }
        report.applied.push(decoded.channel);
    }

    report
}

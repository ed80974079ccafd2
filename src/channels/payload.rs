use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{BookmarkGroup, Settings};

use super::ChannelId;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Serialize, Deserialize)]
struct IconGridPayload {
    #[serde(default)]
    groups: Vec<BookmarkGroup>,
    #[serde(default)]
    settings: Map<String, Value>,
}

/// A channel payload after validation, restricted to what the channel owns.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannel {
    pub channel: ChannelId,
    /// Only present for the bookmarks channel.
    pub groups: Option<Vec<BookmarkGroup>>,
    pub fields: Map<String, Value>,
}

fn owned_subset(channel: ChannelId, settings: &Settings) -> Map<String, Value> {
    settings
        .to_map()
        .into_iter()
        .filter(|(key, _)| channel.owns(key))
        .collect()
}

/// Serialize the part of local state that `channel` is responsible for.
pub fn encode_channel(
    channel: ChannelId,
    groups: &[BookmarkGroup],
    settings: &Settings,
) -> Result<String> {
    let fields = owned_subset(channel, settings);
    let encoded = if channel.carries_bookmarks() {
        serde_json::to_string(&IconGridPayload {
            groups: groups.to_vec(),
            settings: fields,
        })
    } else {
        serde_json::to_string(&fields)
    };
    encoded.with_context(|| format!("failed to encode {channel} payload"))
}

pub fn decode_channel(channel: ChannelId, raw: &str) -> Result<DecodedChannel> {
    let value: Value = serde_json::from_str(raw)
        .with_context(|| format!("{channel} payload is not valid JSON"))?;
    let Value::Object(object) = value else {
        bail!("{channel} payload is not a JSON object");
    };

    let (groups, fields) = if channel.carries_bookmarks() {
        let payload: IconGridPayload = serde_json::from_value(Value::Object(object))
            .with_context(|| format!("{channel} payload has an unexpected shape"))?;
        (Some(dedupe_groups(payload.groups)), payload.settings)
    } else {
        (None, object)
    };

    let fields: Map<String, Value> = fields
        .into_iter()
        .filter(|(key, _)| channel.owns(key))
        .collect();

    Settings::default()
        .with_fields(&fields)
        .with_context(|| format!("{channel} settings have unexpected value types"))?;

    Ok(DecodedChannel {
        channel,
        groups,
        fields,
    })
}

/// Drop repeated group ids, and repeated site ids inside a group, keeping the
/// first occurrence.
fn dedupe_groups(groups: Vec<BookmarkGroup>) -> Vec<BookmarkGroup> {
    let mut seen_groups = HashSet::new();
    groups
        .into_iter()
        .filter(|group| {
            let fresh = seen_groups.insert(group.id.clone());
            if !fresh {
                log_warn!("dropping duplicate group id {} from remote payload", group.id);
            }
            fresh
        })
        .map(|mut group| {
            let mut seen_sites = HashSet::new();
            group.sites.retain(|site| seen_sites.insert(site.id.clone()));
            group
        })
        .collect()
}

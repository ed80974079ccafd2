use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::SettingsField;

/// Remote data domains, each synchronized on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelId {
    Common,
    Sidebar,
    /// Bookmark groups travel with the icon-grid layout fields.
    IconGrid,
    Search,
    Background,
    Standby,
}

impl ChannelId {
    pub const COUNT: usize = 6;

    pub const ALL: [ChannelId; ChannelId::COUNT] = [
        ChannelId::Common,
        ChannelId::Sidebar,
        ChannelId::IconGrid,
        ChannelId::Search,
        ChannelId::Background,
        ChannelId::Standby,
    ];

    pub fn index(self) -> usize {
        match self {
            ChannelId::Common => 0,
            ChannelId::Sidebar => 1,
            ChannelId::IconGrid => 2,
            ChannelId::Search => 3,
            ChannelId::Background => 4,
            ChannelId::Standby => 5,
        }
    }

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Common => "common",
            ChannelId::Sidebar => "sidebar",
            ChannelId::IconGrid => "iconGrid",
            ChannelId::Search => "search",
            ChannelId::Background => "background",
            ChannelId::Standby => "standby",
        }
    }

    pub fn carries_bookmarks(self) -> bool {
        self == ChannelId::IconGrid
    }

    pub fn owned_fields(self) -> impl Iterator<Item = SettingsField> {
        SettingsField::ALL
            .into_iter()
            .filter(move |field| channel_for(*field) == self)
    }

    /// Whether `name` is a settings field this channel is authoritative for.
    pub fn owns(self, name: &str) -> bool {
        SettingsField::from_name(name).map(channel_for) == Some(self)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn channel_for(field: SettingsField) -> ChannelId {
    use SettingsField::*;

    match field {
        Theme | ClockFormat | TemperatureUnit | WeatherLocation | RememberLastGroup
        | OpenInNewTab => ChannelId::Common,
        SidebarPosition | SidebarAutoHide | SidebarCollapsed => ChannelId::Sidebar,
        IconLayout | IconSize | IconRadius | IconGapX | IconGapY | IconShadow | ShowSiteNames
        | ShowAddButton => ChannelId::IconGrid,
        SearchEngine | SearchOpenTarget | ShowSearchBar => ChannelId::Search,
        WallpaperSource | WallpaperBlur | WallpaperRotateMinutes | WallpaperCategory
        | LocalWallpaper => ChannelId::Background,
        StandbyEnabled | StandbyIdleMinutes | StandbyOnOpen | StandbyBlur | StandbyShowClock
        | StandbyShowWeather => ChannelId::Standby,
    }
}

/// Channels touched by a set of changed settings field names. Names the
/// catalog does not know land in `Common`.
pub fn classify<'a, I>(changed: I) -> BTreeSet<ChannelId>
where
    I: IntoIterator<Item = &'a str>,
{
    changed
        .into_iter()
        .map(|name| {
            SettingsField::from_name(name)
                .map(channel_for)
                .unwrap_or(ChannelId::Common)
        })
        .collect()
}

/// Any edit to the group list.
pub fn classify_bookmark_edit() -> BTreeSet<ChannelId> {
    BTreeSet::from([ChannelId::IconGrid])
}

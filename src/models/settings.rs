use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockFormat {
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "24h")]
    H24,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SidebarPosition {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IconLayout {
    Grid,
    Compact,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenTarget {
    CurrentTab,
    NewTab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WallpaperSource {
    Bing,
    Unsplash,
    Local,
    Color,
}

/// Every user-facing preference in one flat record. Missing fields always
/// come back as their defaults, so older payloads never yield holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    // common
    pub theme: Theme,
    pub clock_format: ClockFormat,
    pub temperature_unit: TemperatureUnit,
    pub weather_location: String,
    pub remember_last_group: bool,
    pub open_in_new_tab: bool,

    // sidebar
    pub sidebar_position: SidebarPosition,
    pub sidebar_auto_hide: bool,
    pub sidebar_collapsed: bool,

    // icon grid
    pub icon_layout: IconLayout,
    pub icon_size: u32,
    pub icon_radius: u32,
    pub icon_gap_x: u32,
    pub icon_gap_y: u32,
    pub icon_shadow: bool,
    pub show_site_names: bool,
    pub show_add_button: bool,

    // search
    pub search_engine: String,
    pub search_open_target: OpenTarget,
    pub show_search_bar: bool,

    // background
    pub wallpaper_source: WallpaperSource,
    pub wallpaper_blur: u32,
    pub wallpaper_rotate_minutes: u32,
    pub wallpaper_category: String,
    pub local_wallpaper: Option<String>,

    // standby
    pub standby_enabled: bool,
    pub standby_idle_minutes: u32,
    pub standby_on_open: bool,
    pub standby_blur: u32,
    pub standby_show_clock: bool,
    pub standby_show_weather: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            clock_format: ClockFormat::H24,
            temperature_unit: TemperatureUnit::Celsius,
            weather_location: String::new(),
            remember_last_group: true,
            open_in_new_tab: false,

            sidebar_position: SidebarPosition::Left,
            sidebar_auto_hide: false,
            sidebar_collapsed: false,

            icon_layout: IconLayout::Grid,
            icon_size: 64,
            icon_radius: 16,
            icon_gap_x: 32,
            icon_gap_y: 28,
            icon_shadow: true,
            show_site_names: true,
            show_add_button: true,

            search_engine: "google".to_string(),
            search_open_target: OpenTarget::NewTab,
            show_search_bar: true,

            wallpaper_source: WallpaperSource::Bing,
            wallpaper_blur: 0,
            wallpaper_rotate_minutes: 0,
            wallpaper_category: "nature".to_string(),
            local_wallpaper: None,

            standby_enabled: true,
            standby_idle_minutes: 5,
            standby_on_open: false,
            standby_blur: 12,
            standby_show_clock: true,
            standby_show_weather: true,
        }
    }
}

impl Settings {
    /// Complete a stored or remote object by layering it over the defaults.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("settings object does not match the settings shape")
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Overwrite the given keys and re-validate. Keys that are not settings
    /// fields are dropped.
    pub fn with_fields(&self, fields: &Map<String, Value>) -> Result<Self> {
        let mut map = self.to_map();
        for (key, value) in fields {
            map.insert(key.clone(), value.clone());
        }
        Self::from_value(Value::Object(map))
    }

    /// Like [`Settings::from_value`] but keeps every field that is valid on
    /// its own and defaults the rest. Used for locally stored copies.
    pub fn from_value_lenient(value: Value) -> Self {
        if let Ok(settings) = Self::from_value(value.clone()) {
            return settings;
        }
        let Value::Object(stored) = value else {
            return Self::default();
        };

        let mut settings = Self::default();
        for (key, value) in stored {
            let mut single = Map::new();
            single.insert(key, value);
            if let Ok(next) = settings.with_fields(&single) {
                settings = next;
            }
        }
        settings
    }

    /// Wire names of the fields whose values differ between `self` and `other`.
    pub fn changed_fields(&self, other: &Settings) -> Vec<String> {
        let ours = self.to_map();
        let theirs = other.to_map();
        ours.into_iter()
            .filter(|(key, value)| theirs.get(key) != Some(value))
            .map(|(key, _)| key)
            .collect()
    }
}

/// Closed enumeration of the settings field names, in wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingsField {
    Theme,
    ClockFormat,
    TemperatureUnit,
    WeatherLocation,
    RememberLastGroup,
    OpenInNewTab,
    SidebarPosition,
    SidebarAutoHide,
    SidebarCollapsed,
    IconLayout,
    IconSize,
    IconRadius,
    IconGapX,
    IconGapY,
    IconShadow,
    ShowSiteNames,
    ShowAddButton,
    SearchEngine,
    SearchOpenTarget,
    ShowSearchBar,
    WallpaperSource,
    WallpaperBlur,
    WallpaperRotateMinutes,
    WallpaperCategory,
    LocalWallpaper,
    StandbyEnabled,
    StandbyIdleMinutes,
    StandbyOnOpen,
    StandbyBlur,
    StandbyShowClock,
    StandbyShowWeather,
}

impl SettingsField {
    pub const ALL: [SettingsField; 31] = [
        SettingsField::Theme,
        SettingsField::ClockFormat,
        SettingsField::TemperatureUnit,
        SettingsField::WeatherLocation,
        SettingsField::RememberLastGroup,
        SettingsField::OpenInNewTab,
        SettingsField::SidebarPosition,
        SettingsField::SidebarAutoHide,
        SettingsField::SidebarCollapsed,
        SettingsField::IconLayout,
        SettingsField::IconSize,
        SettingsField::IconRadius,
        SettingsField::IconGapX,
        SettingsField::IconGapY,
        SettingsField::IconShadow,
        SettingsField::ShowSiteNames,
        SettingsField::ShowAddButton,
        SettingsField::SearchEngine,
        SettingsField::SearchOpenTarget,
        SettingsField::ShowSearchBar,
        SettingsField::WallpaperSource,
        SettingsField::WallpaperBlur,
        SettingsField::WallpaperRotateMinutes,
        SettingsField::WallpaperCategory,
        SettingsField::LocalWallpaper,
        SettingsField::StandbyEnabled,
        SettingsField::StandbyIdleMinutes,
        SettingsField::StandbyOnOpen,
        SettingsField::StandbyBlur,
        SettingsField::StandbyShowClock,
        SettingsField::StandbyShowWeather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsField::Theme => "theme",
            SettingsField::ClockFormat => "clockFormat",
            SettingsField::TemperatureUnit => "temperatureUnit",
            SettingsField::WeatherLocation => "weatherLocation",
            SettingsField::RememberLastGroup => "rememberLastGroup",
            SettingsField::OpenInNewTab => "openInNewTab",
            SettingsField::SidebarPosition => "sidebarPosition",
            SettingsField::SidebarAutoHide => "sidebarAutoHide",
            SettingsField::SidebarCollapsed => "sidebarCollapsed",
            SettingsField::IconLayout => "iconLayout",
            SettingsField::IconSize => "iconSize",
            SettingsField::IconRadius => "iconRadius",
            SettingsField::IconGapX => "iconGapX",
            SettingsField::IconGapY => "iconGapY",
            SettingsField::IconShadow => "iconShadow",
            SettingsField::ShowSiteNames => "showSiteNames",
            SettingsField::ShowAddButton => "showAddButton",
            SettingsField::SearchEngine => "searchEngine",
            SettingsField::SearchOpenTarget => "searchOpenTarget",
            SettingsField::ShowSearchBar => "showSearchBar",
            SettingsField::WallpaperSource => "wallpaperSource",
            SettingsField::WallpaperBlur => "wallpaperBlur",
            SettingsField::WallpaperRotateMinutes => "wallpaperRotateMinutes",
            SettingsField::WallpaperCategory => "wallpaperCategory",
            SettingsField::LocalWallpaper => "localWallpaper",
            SettingsField::StandbyEnabled => "standbyEnabled",
            SettingsField::StandbyIdleMinutes => "standbyIdleMinutes",
            SettingsField::StandbyOnOpen => "standbyOnOpen",
            SettingsField::StandbyBlur => "standbyBlur",
            SettingsField::StandbyShowClock => "standbyShowClock",
            SettingsField::StandbyShowWeather => "standbyShowWeather",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.as_str() == name)
    }
}

/// A partial settings update keyed by wire field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    fields: Map<String, Value>,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: SettingsField, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(field.as_str().to_string(), value);
        self
    }

    /// Accepts any JSON object; non-objects yield an empty patch.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

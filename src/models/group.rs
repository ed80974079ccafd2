use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a site tile draws its icon. The serde tag is the discriminant, so only
/// one representation can ever be active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SiteIcon {
    /// Icon resolved from the site's own metadata.
    Official { src: String },
    /// Image the user uploaded.
    Uploaded { src: String },
    /// Short literal text drawn on the tile background.
    Text { text: String },
}

impl Default for SiteIcon {
    fn default() -> Self {
        SiteIcon::Text {
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkSite {
    /// Unique within the owning group only.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_url: Option<String>,
    #[serde(default)]
    pub icon: SiteIcon,
    #[serde(default)]
    pub background: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_scale: Option<f64>,
}

impl BookmarkSite {
    pub fn has_internal_url(&self) -> bool {
        self.internal_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    /// Display and "open all" order.
    #[serde(default)]
    pub sites: Vec<BookmarkSite>,
}

impl BookmarkGroup {
    pub fn site(&self, site_id: &str) -> Option<&BookmarkSite> {
        self.sites.iter().find(|site| site.id == site_id)
    }

    pub fn site_mut(&mut self, site_id: &str) -> Option<&mut BookmarkSite> {
        self.sites.iter_mut().find(|site| site.id == site_id)
    }
}

/// Input for creating or renaming a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

/// Input for creating or editing a site; the id is assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub internal_url: Option<String>,
    #[serde(default)]
    pub icon: SiteIcon,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub icon_scale: Option<f64>,
}

impl SiteInput {
    pub fn into_site(self, id: String) -> BookmarkSite {
        BookmarkSite {
            id,
            name: self.name,
            description: self.description,
            url: self.url,
            internal_url: self.internal_url.filter(|url| !url.trim().is_empty()),
            icon: self.icon,
            background: self.background,
            icon_scale: self.icon_scale,
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_site(id: &str, name: &str, url: &str, text: &str, background: &str) -> BookmarkSite {
    BookmarkSite {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        url: url.to_string(),
        internal_url: None,
        icon: SiteIcon::Text {
            text: text.to_string(),
        },
        background: background.to_string(),
        icon_scale: None,
    }
}

/// The built-in group set shown before login and restored on logout.
pub fn default_groups() -> Vec<BookmarkGroup> {
    vec![
        BookmarkGroup {
            id: "default-home".to_string(),
            name: "Home".to_string(),
            icon: "home".to_string(),
            sites: vec![
                default_site("github", "GitHub", "https://github.com", "GH", "#24292f"),
                default_site("youtube", "YouTube", "https://www.youtube.com", "YT", "#ff0000"),
                default_site("wikipedia", "Wikipedia", "https://www.wikipedia.org", "W", "#636466"),
            ],
        },
        BookmarkGroup {
            id: "default-tools".to_string(),
            name: "Tools".to_string(),
            icon: "tool".to_string(),
            sites: vec![
                default_site("translate", "Translate", "https://translate.google.com", "Tr", "#4285f4"),
                default_site("docs-rs", "Docs.rs", "https://docs.rs", "rs", "#353535"),
            ],
        },
    ]
}

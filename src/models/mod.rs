pub mod group;
pub mod session;
pub mod settings;

pub use group::{default_groups, BookmarkGroup, BookmarkSite, GroupInput, SiteIcon, SiteInput};
pub use session::UserSession;
pub use settings::{Settings, SettingsField, SettingsPatch};

use serde::Serialize;

use crate::models::{
    default_groups, group::new_id, BookmarkGroup, BookmarkSite, GroupInput, Settings, SiteInput,
    UserSession,
};

/// Everything the UI renders from. Mutations here are pure; side effects
/// belong to `LocalStore`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub groups: Vec<BookmarkGroup>,
    pub active_group_id: Option<String>,
    pub settings: Settings,
    pub session: Option<UserSession>,
}

impl Default for StoreState {
    fn default() -> Self {
        let groups = default_groups();
        let active_group_id = groups.first().map(|group| group.id.clone());
        Self {
            groups,
            active_group_id,
            settings: Settings::default(),
            session: None,
        }
    }
}

impl StoreState {
    pub fn group(&self, group_id: &str) -> Option<&BookmarkGroup> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    fn group_mut(&mut self, group_id: &str) -> Option<&mut BookmarkGroup> {
        self.groups.iter_mut().find(|group| group.id == group_id)
    }

    /// The active group, falling back to the first one.
    pub fn active_group(&self) -> Option<&BookmarkGroup> {
        self.active_group_id
            .as_deref()
            .and_then(|id| self.group(id))
            .or_else(|| self.groups.first())
    }

    /// Secret of a logged-in session, if any.
    pub fn session_secret(&self) -> Option<&str> {
        self.session
            .as_ref()
            .filter(|session| session.is_active())
            .map(|session| session.secret.as_str())
    }

    /// Point the active id at an existing group, or at the first group.
    pub fn heal_active_group(&mut self) {
        let resolves = self
            .active_group_id
            .as_deref()
            .map(|id| self.group(id).is_some())
            .unwrap_or(false);
        if !resolves {
            self.active_group_id = self.groups.first().map(|group| group.id.clone());
        }
    }

    pub fn replace_groups(&mut self, groups: Vec<BookmarkGroup>) {
        self.groups = groups;
        self.heal_active_group();
    }

    pub fn reset_to_defaults(&mut self) {
        self.groups = default_groups();
        self.active_group_id = self.groups.first().map(|group| group.id.clone());
    }

    pub fn add_group(&mut self, input: GroupInput) -> String {
        let id = new_id();
        self.groups.push(BookmarkGroup {
            id: id.clone(),
            name: input.name,
            icon: input.icon,
            sites: Vec::new(),
        });
        self.heal_active_group();
        id
    }

    pub fn update_group(&mut self, group_id: &str, input: GroupInput) -> bool {
        let Some(group) = self.group_mut(group_id) else {
            return false;
        };
        if group.name == input.name && group.icon == input.icon {
            return false;
        }
        group.name = input.name;
        group.icon = input.icon;
        true
    }

    pub fn delete_group(&mut self, group_id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|group| group.id != group_id);
        if self.groups.len() == before {
            return false;
        }
        self.heal_active_group();
        true
    }

    pub fn set_active_group(&mut self, group_id: &str) -> bool {
        if self.group(group_id).is_none() || self.active_group_id.as_deref() == Some(group_id) {
            return false;
        }
        self.active_group_id = Some(group_id.to_string());
        true
    }

    pub fn add_site(&mut self, group_id: &str, input: SiteInput) -> Option<String> {
        let group = self.group_mut(group_id)?;
        let id = new_id();
        group.sites.push(input.into_site(id.clone()));
        Some(id)
    }

    /// Replace the site with the same id inside `group_id`.
    pub fn update_site(&mut self, group_id: &str, site: BookmarkSite) -> bool {
        let Some(existing) = self
            .group_mut(group_id)
            .and_then(|group| group.site_mut(&site.id))
        else {
            return false;
        };
        if *existing == site {
            return false;
        }
        *existing = site;
        true
    }

    pub fn delete_site(&mut self, group_id: &str, site_id: &str) -> bool {
        let Some(group) = self.group_mut(group_id) else {
            return false;
        };
        let before = group.sites.len();
        group.sites.retain(|site| site.id != site_id);
        group.sites.len() != before
    }

    /// Move a site to `to_index` within its group; the index is clamped.
    pub fn reorder_site(&mut self, group_id: &str, site_id: &str, to_index: usize) -> bool {
        let Some(group) = self.group_mut(group_id) else {
            return false;
        };
        let Some(from) = group.sites.iter().position(|site| site.id == site_id) else {
            return false;
        };
        let to = to_index.min(group.sites.len() - 1);
        if from == to {
            return false;
        }
        let site = group.sites.remove(from);
        group.sites.insert(to, site);
        true
    }

    /// Move a site into another group, appending unless `to_index` is given.
    /// The site is re-keyed if its id is already taken in the target group.
    pub fn move_site(
        &mut self,
        from_group: &str,
        site_id: &str,
        to_group: &str,
        to_index: Option<usize>,
    ) -> bool {
        if from_group == to_group {
            return match to_index {
                Some(index) => self.reorder_site(from_group, site_id, index),
                None => false,
            };
        }
        if self.group(to_group).is_none() {
            return false;
        }
        let Some(source) = self.group_mut(from_group) else {
            return false;
        };
        let Some(position) = source.sites.iter().position(|site| site.id == site_id) else {
            return false;
        };
        let mut site = source.sites.remove(position);

        let Some(target) = self.group_mut(to_group) else {
            return false;
        };
        if target.site(&site.id).is_some() {
            site.id = new_id();
        }
        let index = to_index.unwrap_or(target.sites.len()).min(target.sites.len());
        target.sites.insert(index, site);
        true
    }
}

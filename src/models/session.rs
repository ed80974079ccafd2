use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated account. `secret` is the only credential the gateway needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    pub secret: String,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub logged_in_at: Option<DateTime<Utc>>,
}

impl UserSession {
    pub fn is_active(&self) -> bool {
        self.logged_in && !self.secret.is_empty()
    }
}

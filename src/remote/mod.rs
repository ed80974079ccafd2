pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::channels::ChannelId;
use crate::models::UserSession;

pub use http::HttpGateway;

/// Authenticated access to the account's remote channels. Payloads are
/// opaque JSON strings at this level.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// `None` when the server holds nothing for the channel yet.
    async fn fetch_channel(&self, secret: &str, channel: ChannelId) -> Result<Option<String>>;

    /// `false` when the server answered but refused the write.
    async fn push_channel(&self, secret: &str, channel: ChannelId, payload: &str) -> Result<bool>;

    async fn login(&self, email: &str, password: &str) -> Result<UserSession>;
}

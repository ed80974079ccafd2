use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::channels::ChannelId;
use crate::models::UserSession;

use super::RemoteGateway;

const SECRET_HEADER: &str = "X-Secret";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize, Deserialize)]
struct ChannelEnvelope {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default = "default_true")]
    success: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    avatar: String,
    secret: String,
}

/// Talks to the account API over HTTPS.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("invalid API base url '{base_url}'"))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, base })
    }

    pub fn channel_url(&self, channel: ChannelId) -> Result<Url> {
        self.base
            .join(&format!("sync/{}", channel.as_str()))
            .map_err(|err| anyhow!("cannot build url for {channel}: {err}"))
    }

    fn login_url(&self) -> Result<Url> {
        self.base
            .join("login")
            .map_err(|err| anyhow!("cannot build login url: {err}"))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_channel(&self, secret: &str, channel: ChannelId) -> Result<Option<String>> {
        let res = self
            .client
            .get(self.channel_url(channel)?)
            .header(SECRET_HEADER, secret)
            .send()
            .await
            .with_context(|| format!("fetch of {channel} failed"))?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            bail!("fetch of {channel} failed: HTTP {}", res.status());
        }

        let envelope: ChannelEnvelope = res
            .json()
            .await
            .with_context(|| format!("fetch of {channel} returned an unreadable body"))?;
        Ok(envelope.data)
    }

    async fn push_channel(&self, secret: &str, channel: ChannelId, payload: &str) -> Result<bool> {
        let res = self
            .client
            .post(self.channel_url(channel)?)
            .header(SECRET_HEADER, secret)
            .json(&ChannelEnvelope {
                data: Some(payload.to_string()),
            })
            .send()
            .await
            .with_context(|| format!("push of {channel} failed"))?;

        if !res.status().is_success() {
            return Ok(false);
        }
        // An empty or non-JSON 2xx body still counts as accepted.
        let accepted = res
            .json::<PushResponse>()
            .await
            .map(|body| body.success)
            .unwrap_or(true);
        Ok(accepted)
    }

    async fn login(&self, email: &str, password: &str) -> Result<UserSession> {
        let res = self
            .client
            .post(self.login_url()?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("login request failed")?;

        if !res.status().is_success() {
            bail!("login rejected: HTTP {}", res.status());
        }

        let body: LoginResponse = res.json().await.context("login response is unreadable")?;
        if body.secret.is_empty() {
            bail!("login response carried no secret");
        }

        Ok(UserSession {
            email: body.email,
            name: body.name,
            avatar: body.avatar,
            secret: body.secret,
            logged_in: true,
            logged_in_at: Some(Utc::now()),
        })
    }
}

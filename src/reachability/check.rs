use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use tokio::net::TcpStream;
use url::Url;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// One reachability probe. `Ok(false)` means the host did not answer;
/// `Err` means the probe itself could not be attempted.
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self, url: &str) -> Result<bool>;
}

/// Two-stage network probe. Any HTTP response, whatever the status, proves
/// the host answered. When the request fails outright, a plain TCP connect
/// to the same host and port decides.
pub struct NetworkCheck {
    client: reqwest::Client,
}

impl NetworkCheck {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .redirect(Policy::none())
            // Internal hosts commonly serve self-signed certificates.
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build reachability HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReachabilityCheck for NetworkCheck {
    async fn check(&self, url: &str) -> Result<bool> {
        let parsed = Url::parse(url).with_context(|| format!("invalid internal URL '{url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("unsupported scheme '{}' in '{url}'", parsed.scheme());
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow!("'{url}' has no host"))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| anyhow!("'{url}' has no port"))?;

        match self.client.get(parsed).send().await {
            Ok(response) => {
                log_debug!("{url} answered HTTP {}", response.status());
                return Ok(true);
            }
            Err(err) => log_debug!("HTTP probe of {url} failed ({err}); trying TCP"),
        }

        let host = host.trim_start_matches('[').trim_end_matches(']');
        match TcpStream::connect((host, port)).await {
            Ok(_) => Ok(true),
            Err(err) => {
                log_debug!("TCP probe of {host}:{port} failed: {err}");
                Ok(false)
            }
        }
    }
}

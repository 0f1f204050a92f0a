//! reqwest-backed [`IntermediateFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use tracing::debug;

use super::user_agent::{self, resolve_user_agent};
use super::{IntermediateFetcher, ResolveError};

/// Plain HTTP GET with a referrer and browser-like headers.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `user_agent_config` follows [`resolve_user_agent`].
    pub fn new(timeout: Duration, user_agent_config: Option<&str>) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent_config))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl IntermediateFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, referrer: &str) -> Result<String, ResolveError> {
        debug!("GET {} (referer {})", url, referrer);
        let resp = self
            .client
            .get(url)
            .header(REFERER, referrer)
            .header(ACCEPT, user_agent::ACCEPT)
            .header(ACCEPT_LANGUAGE, user_agent::ACCEPT_LANGUAGE)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolveError::Timeout
                } else {
                    ResolveError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        resp.text()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))
    }
}

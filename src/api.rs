use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::FeedItem;

pub const FEED_PATH: &str = "videos/feed";
pub const REMIX_PATH: &str = "remix";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            user_agent: format!("reelfeed/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            http_client: None,
        }
    }
}

/// Body of `POST /remix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemixRequest {
    pub video_id: String,
    pub prompt: String,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }

        let base_url = parse_base_url(&config.base_url)?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout)
                .build()
                .context("build feed http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn feed(&self, skip: usize, limit: usize) -> Result<Vec<FeedItem>> {
        let mut url = self.endpoint(FEED_PATH)?;
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &limit.to_string());

        let response = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("request feed from {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("feed request failed: {} - {}", status, body.trim());
        }

        response.json().context("decode feed response")
    }

    pub fn remix(&self, request: &RemixRequest) -> Result<()> {
        let url = self.endpoint(REMIX_PATH)?;
        let response = self
            .http
            .post(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .json(request)
            .send()
            .with_context(|| format!("submit remix to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("remix request failed: {} - {}", status, body.trim());
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("build endpoint {path} from {}", self.base_url))
    }
}

// Url::join drops the last path segment unless the base ends with '/'.
fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("feed client base url required");
    }
    let mut normalized = trimmed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).with_context(|| format!("parse base url {trimmed:?}"))
}

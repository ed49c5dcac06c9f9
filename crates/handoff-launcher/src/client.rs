use std::time::Duration;

use anyhow::{Context, Result};
use handoff_core::API_TOKEN_HEADER;
use handoff_types::ConnectionPayload;
use reqwest::{Client, StatusCode, Url};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(ConnectionPayload),
    Empty,
    Failed { status: u16, body: String },
    Malformed { error: String, body: String },
}

#[derive(Clone)]
pub struct LauncherClient {
    base_url: String,
    client: Client,
    api_token: Option<String>,
}

/// True when `poll` will fetch exactly once: no interval, or no time left for a retry.
pub fn polls_once(interval: Duration, timeout: Duration) -> bool {
    interval.is_zero() || interval > timeout
}

pub fn fetch_url(base_url: &str, user_id: &str) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/fetch_connection",
        base_url.trim_end_matches('/')
    ))
    .with_context(|| format!("invalid api base url `{base_url}`"))?;
    url.query_pairs_mut().append_pair("userId", user_id);
    Ok(url)
}

impl LauncherClient {
    pub fn new(base_url: String, timeout: Duration, api_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            base_url,
            client,
            api_token: api_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch(&self, user_id: &str) -> Result<FetchOutcome> {
        let url = fetch_url(&self.base_url, user_id)?;
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.api_token {
            request = request.header(API_TOKEN_HEADER, token);
        }
        let resp = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Ok(classify(status, body))
    }

    /// Fetches once when `polls_once` holds, otherwise until found or `timeout` passes.
    pub async fn poll(
        &self,
        user_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<FetchOutcome> {
        let started = Instant::now();
        loop {
            let outcome = self.fetch(user_id).await?;
            if outcome != FetchOutcome::Empty
                || interval.is_zero()
                || started.elapsed() + interval > timeout
            {
                return Ok(outcome);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

fn classify(status: StatusCode, body: String) -> FetchOutcome {
    match status {
        StatusCode::NOT_FOUND => FetchOutcome::Empty,
        StatusCode::OK => match serde_json::from_str::<ConnectionPayload>(&body) {
            Ok(payload) => FetchOutcome::Found(payload),
            Err(err) => FetchOutcome::Malformed {
                error: err.to_string(),
                body,
            },
        },
        other => FetchOutcome::Failed {
            status: other.as_u16(),
            body,
        },
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use handoff_core::API_TOKEN_HEADER;
use handoff_types::QueueConnectionRequest;
use reqwest::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Sent(u16),
    Rejected { status: u16, body: String },
}

impl QueueOutcome {
    /// Status string shown in the history table.
    pub fn history_status(&self) -> String {
        match self {
            QueueOutcome::Sent(status) => format!("SENT ({status} OK)"),
            QueueOutcome::Rejected { status, .. } => format!("ERROR ({status})"),
        }
    }
}

#[derive(Clone)]
pub struct QueueClient {
    endpoint: String,
    client: Client,
    api_token: Option<String>,
}

impl QueueClient {
    pub fn new(api_base_url: &str, api_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building queue http client")?;
        Ok(Self {
            endpoint: format!("{}/queue_connection", api_base_url.trim_end_matches('/')),
            client,
            api_token: api_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn queue(&self, request: &QueueConnectionRequest) -> Result<QueueOutcome> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(token) = &self.api_token {
            builder = builder.header(API_TOKEN_HEADER, token);
        }
        let resp = builder
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = resp.status();
        if status.as_u16() == 200 || status.as_u16() == 201 {
            return Ok(QueueOutcome::Sent(status.as_u16()));
        }
        let body = resp.text().await.unwrap_or_default();
        Ok(QueueOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

use std::sync::Arc;

use handoff_core::{now_ms, ConnectionStore, DEFAULT_REQUEST_TTL_SECS};

mod http;

pub use http::{app_router, serve};

pub const REAPER_INTERVAL_SECS: u64 = 5;

#[derive(Clone)]
pub struct QueueState {
    pub store: Arc<dyn ConnectionStore>,
    pub ttl_secs: u64,
    pub api_token: Option<String>,
    pub started_at_ms: u64,
}

impl QueueState {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            store,
            ttl_secs: DEFAULT_REQUEST_TTL_SECS,
            api_token: None,
            started_at_ms: now_ms(),
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs.max(1);
        self
    }

    /// Blank tokens disable auth.
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }
}

pub fn build_id() -> String {
    if let Some(explicit) = option_env!("HANDOFF_BUILD_ID") {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    env!("CARGO_PKG_VERSION").to_string()
}

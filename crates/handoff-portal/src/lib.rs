use std::sync::Arc;

use anyhow::Context;

pub mod catalog;
pub mod error;
mod http;
pub mod history;
pub mod oidc;
pub mod queue_client;
pub mod redirect;
pub mod render;
pub mod session;

pub use catalog::{demo_catalog, find_target, load_catalog, Target};
pub use error::PortalError;
pub use history::{History, HistoryEntry};
pub use http::{app_router, serve};
pub use oidc::{OidcClient, OidcConfig};
pub use queue_client::{QueueClient, QueueOutcome};
pub use redirect::{VdiConfig, VdiRedirect};
pub use session::SessionStore;

pub const DEFAULT_PORTAL_USER: &str = "operator@example.com";

#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Queue API base, e.g. `http://127.0.0.1:7071/api`.
    pub queue_url: String,
    pub api_token: Option<String>,
    pub catalog: Vec<Target>,
    /// User that requests are queued for when sign-in is disabled.
    pub default_user: String,
    pub oidc: Option<OidcConfig>,
    pub vdi: VdiConfig,
    pub secure_cookie: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            queue_url: format!(
                "http://{}:{}/api",
                handoff_core::DEFAULT_QUEUE_HOST,
                handoff_core::DEFAULT_QUEUE_PORT
            ),
            api_token: None,
            catalog: demo_catalog(),
            default_user: DEFAULT_PORTAL_USER.to_string(),
            oidc: None,
            vdi: VdiConfig::default(),
            secure_cookie: false,
        }
    }
}

#[derive(Clone)]
pub struct PortalState {
    pub catalog: Arc<Vec<Target>>,
    pub queue: QueueClient,
    pub history: History,
    pub sessions: SessionStore,
    pub oidc: Option<OidcClient>,
    pub default_user: String,
    pub vdi: Option<VdiRedirect>,
}

impl PortalState {
    pub fn from_config(config: PortalConfig) -> anyhow::Result<Self> {
        let default_user = handoff_core::normalize_user_id(&config.default_user)
            .context("default portal user must not be blank")?;
        let oidc = config
            .oidc
            .map(OidcClient::new)
            .transpose()
            .context("building oidc client")?;
        Ok(Self {
            catalog: Arc::new(config.catalog),
            queue: QueueClient::new(&config.queue_url, config.api_token)?,
            history: History::new(),
            sessions: SessionStore::new(config.secure_cookie),
            oidc,
            default_user,
            vdi: VdiRedirect::from_config(&config.vdi),
        })
    }

    pub fn sign_in_required(&self) -> bool {
        self.oidc.is_some()
    }
}

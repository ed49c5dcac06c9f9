use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use handoff_core::{
    ConnectionStore, FileConnectionStore, MemoryConnectionStore, DEFAULT_PORTAL_PORT,
    DEFAULT_QUEUE_HOST, DEFAULT_QUEUE_PORT, DEFAULT_REQUEST_TTL_SECS,
};
use handoff_observability::{
    default_logs_dir, emit_event, init_process_logging, ObservabilityEvent, ProcessKind,
};
use handoff_portal::oidc::DEFAULT_SCOPES;
use handoff_portal::{
    demo_catalog, load_catalog, OidcConfig, PortalConfig, PortalState, VdiConfig,
    DEFAULT_PORTAL_USER,
};
use handoff_server::QueueState;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

const LOG_RETENTION_DAYS: u64 = 14;

#[derive(Parser, Debug)]
#[command(name = "handoff")]
#[command(about = "Connection handoff queue API and operator portal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the connection queue API.
    Queue {
        #[arg(long, alias = "host", env = "HANDOFF_QUEUE_HOSTNAME", default_value = DEFAULT_QUEUE_HOST)]
        hostname: String,
        #[arg(long, env = "HANDOFF_QUEUE_PORT", default_value_t = DEFAULT_QUEUE_PORT)]
        port: u16,
        #[arg(long, env = "HANDOFF_TTL_SECS", default_value_t = DEFAULT_REQUEST_TTL_SECS)]
        ttl_secs: u64,
        /// JSON file that keeps pending requests across restarts. In-memory when unset.
        #[arg(long, env = "HANDOFF_STORE_PATH")]
        store_path: Option<PathBuf>,
        #[arg(long, env = "HANDOFF_API_TOKEN")]
        api_token: Option<String>,
        #[arg(long, env = "HANDOFF_LOGS_DIR")]
        logs_dir: Option<PathBuf>,
    },
    /// Serve the operator portal.
    Portal {
        #[arg(long, alias = "host", env = "HANDOFF_PORTAL_HOSTNAME", default_value = DEFAULT_QUEUE_HOST)]
        hostname: String,
        #[arg(long, env = "HANDOFF_PORTAL_PORT", default_value_t = DEFAULT_PORTAL_PORT)]
        port: u16,
        /// Queue API base URL, ending in `/api`.
        #[arg(long, env = "HANDOFF_QUEUE_URL")]
        queue_url: Option<String>,
        #[arg(long, env = "HANDOFF_API_TOKEN")]
        api_token: Option<String>,
        /// JSON array of targets. The demo catalog is used when unset.
        #[arg(long, env = "HANDOFF_CATALOG")]
        catalog: Option<PathBuf>,
        #[arg(long, env = "HANDOFF_DEFAULT_USER", default_value = DEFAULT_PORTAL_USER)]
        default_user: String,
        #[arg(long, env = "HANDOFF_OIDC_ISSUER")]
        oidc_issuer: Option<String>,
        #[arg(long, env = "HANDOFF_OIDC_CLIENT_ID")]
        oidc_client_id: Option<String>,
        #[arg(long, env = "HANDOFF_OIDC_CLIENT_SECRET")]
        oidc_client_secret: Option<String>,
        /// Externally visible portal URL, used for the OIDC redirect.
        #[arg(long, env = "HANDOFF_PUBLIC_URL")]
        public_url: Option<String>,
        #[arg(long, env = "HANDOFF_VDI_WEB_CLIENT_URL")]
        vdi_web_client_url: Option<String>,
        #[arg(long, env = "HANDOFF_VDI_WORKSPACE_ID")]
        vdi_workspace_id: Option<String>,
        #[arg(long, env = "HANDOFF_VDI_RESOURCE_ID")]
        vdi_resource_id: Option<String>,
        #[arg(long, env = "HANDOFF_LOGS_DIR")]
        logs_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Queue {
            hostname,
            port,
            ttl_secs,
            store_path,
            api_token,
            logs_dir,
        } => {
            let _log_guard = init_logging(ProcessKind::Queue, logs_dir)?;
            let addr = parse_addr(&hostname, port)?;
            let store = build_store(store_path).await?;
            let state = QueueState::new(store)
                .with_ttl_secs(ttl_secs)
                .with_api_token(api_token);
            info!(
                "queue starting addr={} ttl_secs={} api_token_required={}",
                addr,
                state.ttl_secs,
                state.api_token.is_some()
            );
            handoff_server::serve(addr, state).await?;
        }
        Command::Portal {
            hostname,
            port,
            queue_url,
            api_token,
            catalog,
            default_user,
            oidc_issuer,
            oidc_client_id,
            oidc_client_secret,
            public_url,
            vdi_web_client_url,
            vdi_workspace_id,
            vdi_resource_id,
            logs_dir,
        } => {
            let _log_guard = init_logging(ProcessKind::Portal, logs_dir)?;
            let addr = parse_addr(&hostname, port)?;
            let public_url = public_url.unwrap_or_else(|| format!("http://{addr}"));
            let config = PortalConfig {
                queue_url: queue_url.unwrap_or_else(default_queue_url),
                api_token,
                catalog: match catalog {
                    Some(path) => load_catalog(&path)?,
                    None => demo_catalog(),
                },
                default_user,
                oidc: oidc_config(
                    oidc_issuer,
                    oidc_client_id,
                    oidc_client_secret,
                    &public_url,
                )?,
                vdi: VdiConfig {
                    web_client_url: vdi_web_client_url,
                    workspace_id: vdi_workspace_id,
                    resource_id: vdi_resource_id,
                },
                secure_cookie: public_url.starts_with("https://"),
            };
            info!(
                "portal starting addr={} queue_url={} targets={} sign_in={}",
                addr,
                config.queue_url,
                config.catalog.len(),
                config.oidc.is_some()
            );
            let state = PortalState::from_config(config)?;
            handoff_portal::serve(addr, state).await?;
        }
    }

    Ok(())
}

fn init_logging(
    process: ProcessKind,
    logs_dir: Option<PathBuf>,
) -> anyhow::Result<WorkerGuard> {
    let logs_dir = logs_dir.unwrap_or_else(default_logs_dir);
    let (guard, log_info) = init_process_logging(process, &logs_dir, LOG_RETENTION_DAYS)?;
    emit_event(
        tracing::Level::INFO,
        process,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "engine.main",
            status: Some("ok"),
            detail: Some("jsonl logging initialized"),
            ..Default::default()
        },
    );
    info!("{} logging initialized: {:?}", process.as_str(), log_info);
    Ok(guard)
}

fn parse_addr(hostname: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{hostname}:{port}")
        .parse()
        .context("invalid hostname or port")
}

fn default_queue_url() -> String {
    format!("http://{DEFAULT_QUEUE_HOST}:{DEFAULT_QUEUE_PORT}/api")
}

async fn build_store(path: Option<PathBuf>) -> anyhow::Result<Arc<dyn ConnectionStore>> {
    match path {
        Some(path) => {
            let store = FileConnectionStore::open(&path)
                .await
                .with_context(|| format!("opening connection store {}", path.display()))?;
            info!("connection store: {}", store.path().display());
            Ok(Arc::new(store))
        }
        None => {
            info!("connection store: in-memory");
            Ok(Arc::new(MemoryConnectionStore::new()))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Sign-in is on only when both issuer and client id are set.
fn oidc_config(
    issuer: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    public_url: &str,
) -> anyhow::Result<Option<OidcConfig>> {
    match (non_blank(issuer), non_blank(client_id)) {
        (None, None) => Ok(None),
        (Some(issuer), Some(client_id)) => {
            let public_url = public_url.trim_end_matches('/');
            Ok(Some(OidcConfig {
                issuer,
                client_id,
                client_secret: non_blank(client_secret),
                redirect_url: format!("{public_url}/auth/callback"),
                scopes: DEFAULT_SCOPES.to_string(),
                post_logout_redirect_url: format!("{public_url}/"),
            }))
        }
        _ => anyhow::bail!("--oidc-issuer and --oidc-client-id must be set together"),
    }
}

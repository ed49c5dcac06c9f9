use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use handoff_launcher::launch::{DEFAULT_CONSOLE_DIR, DEFAULT_CONSOLE_PATH};
use handoff_launcher::{run, LauncherOptions};
use handoff_observability::{init_process_logging, ProcessKind};

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:7071/api";

#[derive(Parser, Debug)]
#[command(name = "handoff-launcher")]
#[command(about = "Claims a queued connection request and opens the management console")]
struct Cli {
    #[arg(long, env = "HANDOFF_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,
    #[arg(long, env = "HANDOFF_API_TOKEN")]
    api_token: Option<String>,
    #[arg(long, env = "HANDOFF_OVERRIDE_USER", default_value = "")]
    override_user: String,
    #[arg(long, env = "HANDOFF_CONSOLE_PATH", default_value = DEFAULT_CONSOLE_PATH)]
    console_path: PathBuf,
    #[arg(long, env = "HANDOFF_CONSOLE_DIR", default_value = DEFAULT_CONSOLE_DIR)]
    console_dir: PathBuf,
    /// HTTP timeout in seconds.
    #[arg(long, env = "HANDOFF_HTTP_TIMEOUT", default_value_t = 15)]
    http_timeout: u64,
    /// Do not pass -u/-s to the console.
    #[arg(long, env = "HANDOFF_NO_CONSOLE_ARGS", default_value_t = false)]
    no_console_args: bool,
    /// If >0, wait this many seconds before exiting when no request is found.
    #[arg(long, env = "HANDOFF_WAIT_SECONDS_IF_NO_REQUEST", default_value_t = 0)]
    wait_seconds_if_no_request: u64,
    /// Seconds between fetches; 0 fetches once.
    #[arg(long, env = "HANDOFF_POLL_INTERVAL", default_value_t = 0)]
    poll_interval: u64,
    /// Seconds to keep polling. Must be at least --poll-interval, otherwise the
    /// launcher fetches once.
    #[arg(long, env = "HANDOFF_POLL_TIMEOUT", default_value_t = 0)]
    poll_timeout: u64,
    /// Fill the console login fields after launch.
    #[arg(long, env = "HANDOFF_AUTOFILL", default_value_t = false)]
    autofill: bool,
    #[arg(long, env = "HANDOFF_AUTOFILL_TIMEOUT", default_value_t = 60)]
    autofill_timeout: u64,
    /// Seconds to keep the window open after an error.
    #[arg(long, env = "HANDOFF_ERROR_PAUSE", default_value_t = 5)]
    error_pause: u64,
    #[arg(long, default_value_t = false)]
    skip_bootstrap: bool,
    #[arg(long, env = "HANDOFF_LAUNCHER_LOGS_DIR")]
    logs_dir: Option<PathBuf>,
}

fn default_logs_dir() -> PathBuf {
    std::env::var("TEMP")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("handoff-launcher")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logs_dir = cli.logs_dir.clone().unwrap_or_else(default_logs_dir);
    let (_log_guard, log_info) = init_process_logging(ProcessKind::Launcher, &logs_dir, 7)?;
    tracing::info!("launcher logging initialized: {:?}", log_info);

    let options = LauncherOptions {
        api_base_url: cli.api_base_url,
        api_token: cli.api_token,
        override_user: Some(cli.override_user).filter(|v| !v.trim().is_empty()),
        console_path: cli.console_path,
        console_dir: Some(cli.console_dir),
        http_timeout: Duration::from_secs(cli.http_timeout.max(1)),
        pass_console_args: !cli.no_console_args,
        wait_if_no_request: Duration::from_secs(cli.wait_seconds_if_no_request),
        poll_interval: Duration::from_secs(cli.poll_interval),
        poll_timeout: Duration::from_secs(cli.poll_timeout),
        autofill: cli.autofill,
        autofill_timeout: Duration::from_secs(cli.autofill_timeout),
        error_pause: Duration::from_secs(cli.error_pause),
        bootstrap: !cli.skip_bootstrap,
    };

    let code = run(options).await;
    drop(_log_guard);
    std::process::exit(code);
}

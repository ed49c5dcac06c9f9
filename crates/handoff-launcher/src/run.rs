use std::path::PathBuf;
use std::time::Duration;

use handoff_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use handoff_types::ConnectionPayload;

use crate::autofill::{self, AutofillSettings, AutofillTarget};
use crate::bootstrap::{bootstrap_user_profile, ProfileEnv};
use crate::client::{fetch_url, polls_once, FetchOutcome, LauncherClient};
use crate::identity::resolve_user_id;
use crate::launch::console_command;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;

#[derive(Debug, Clone)]
pub struct LauncherOptions {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub override_user: Option<String>,
    pub console_path: PathBuf,
    pub console_dir: Option<PathBuf>,
    pub http_timeout: Duration,
    pub pass_console_args: bool,
    pub wait_if_no_request: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub autofill: bool,
    pub autofill_timeout: Duration,
    pub error_pause: Duration,
    pub bootstrap: bool,
}

fn obs(event: &str, status: &str, user_id: Option<&str>, detail: Option<&str>) {
    let level = if status == "failed" {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    emit_event(
        level,
        ProcessKind::Launcher,
        ObservabilityEvent {
            event,
            component: "launcher.run",
            user_id,
            status: Some(status),
            detail,
            ..Default::default()
        },
    );
}

async fn fail(message: String, pause: Duration) -> i32 {
    println!("[ERROR] {message}");
    tracing::error!("{}", message);
    tokio::time::sleep(pause).await;
    EXIT_FAILED
}

/// Full launcher flow; returns the process exit code.
pub async fn run(options: LauncherOptions) -> i32 {
    tracing::info!(
        "launcher started host={} session={} user={}",
        std::env::var("COMPUTERNAME").unwrap_or_default(),
        std::env::var("SESSIONNAME").unwrap_or_default(),
        std::env::var("USERNAME").unwrap_or_default()
    );

    if options.bootstrap {
        let outcome = bootstrap_user_profile(&ProfileEnv::from_env());
        tracing::info!("profile bootstrap: {:?}", outcome);
    }

    let user_id = resolve_user_id(options.override_user.as_deref()).await;

    let client = match LauncherClient::new(
        options.api_base_url.clone(),
        options.http_timeout,
        options.api_token.clone(),
    ) {
        Ok(client) => client,
        Err(err) => return fail(format!("{err:#}"), options.error_pause).await,
    };
    match fetch_url(client.base_url(), &user_id) {
        Ok(url) => {
            println!("[INFO] Polling API: {url}");
            tracing::info!("polling api: {}", url);
        }
        Err(err) => return fail(format!("{err:#}"), options.error_pause).await,
    }

    if !options.poll_interval.is_zero() && polls_once(options.poll_interval, options.poll_timeout)
    {
        println!("[INFO] Poll timeout is shorter than the poll interval; fetching once.");
        tracing::warn!(
            "poll_interval={:?} with poll_timeout={:?} fetches once",
            options.poll_interval,
            options.poll_timeout
        );
    }

    let outcome = match client
        .poll(&user_id, options.poll_interval, options.poll_timeout)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            obs("launcher.fetch", "failed", Some(&user_id), Some(&format!("{err:#}")));
            return fail(format!("HTTP request failed: {err:#}"), options.error_pause).await;
        }
    };

    let payload = match outcome {
        FetchOutcome::Found(payload) => payload,
        FetchOutcome::Empty => {
            println!("[INFO] No pending connection requests for user {user_id}.");
            obs("launcher.fetch", "empty", Some(&user_id), None);
            if !options.wait_if_no_request.is_zero() {
                tokio::time::sleep(options.wait_if_no_request).await;
            }
            return EXIT_OK;
        }
        FetchOutcome::Failed { status, body } => {
            obs("launcher.fetch", "failed", Some(&user_id), Some(&body));
            return fail(
                format!("API returned status {status}: {body}"),
                options.error_pause,
            )
            .await;
        }
        FetchOutcome::Malformed { error, body } => {
            obs("launcher.fetch", "failed", Some(&user_id), Some(&body));
            return fail(
                format!("Failed to parse API response as JSON: {error}"),
                options.error_pause,
            )
            .await;
        }
    };

    report_found(&payload, &user_id);
    launch_and_wait(&options, &payload).await
}

fn report_found(payload: &ConnectionPayload, user_id: &str) {
    let target = payload.target_ip.as_deref().unwrap_or("");
    let username = payload.username.as_deref().unwrap_or("");
    println!("[SUCCESS] Connection Request Found!");
    println!("    Target: {target}");
    println!("    User:   {username}");
    let password = payload
        .password
        .as_deref()
        .map(redact_text)
        .unwrap_or_default();
    tracing::info!(
        "connection found target_ip={} username={} password={}",
        target,
        username,
        password
    );
    obs("launcher.fetch", "found", Some(user_id), Some(target));
}

async fn launch_and_wait(options: &LauncherOptions, payload: &ConnectionPayload) -> i32 {
    let launch_pause = options.error_pause * 2;
    let plan = console_command(
        options.console_path.clone(),
        options.console_dir.clone(),
        payload,
        options.pass_console_args,
    );
    if !plan.program_exists() {
        return fail(
            format!("Console not found at: {}", plan.program.display()),
            launch_pause,
        )
        .await;
    }

    tracing::info!("launching console: {}", plan);
    let mut child = match plan.spawn() {
        Ok(child) => child,
        Err(err) => return fail(format!("{err:#}"), launch_pause).await,
    };

    if options.autofill {
        if let Some(pid) = child.id() {
            spawn_autofill(pid, payload, options.autofill_timeout);
        }
    }

    println!("[INFO] Waiting for console to exit...");
    match child.wait().await {
        Ok(status) => tracing::info!("console exited rc={:?}", status.code()),
        Err(err) => tracing::warn!("waiting for console failed: {}", err),
    }
    EXIT_OK
}

fn spawn_autofill(pid: u32, payload: &ConnectionPayload, timeout: Duration) {
    let target = AutofillTarget {
        username: payload.username.clone(),
        server: payload.target_ip.clone(),
    };
    let settings = AutofillSettings {
        timeout,
        ..Default::default()
    };
    tokio::task::spawn_blocking(move || {
        let backend = autofill::default_backend();
        match autofill::autofill(backend.as_ref(), pid, &target, settings) {
            Ok(outcome) => tracing::info!("autofill finished: {:?}", outcome),
            Err(err) => tracing::warn!("autofill skipped: {}", err),
        }
    });
}

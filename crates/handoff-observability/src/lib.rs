use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const EVENT_TARGET: &str = "handoff.obs";
const LOG_SUFFIX: &str = "jsonl";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Queue,
    Portal,
    Launcher,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Queue => "queue",
            ProcessKind::Portal => "portal",
            ProcessKind::Launcher => "launcher",
        }
    }

    /// Log file stem; the appender adds `.YYYY-MM-DD.jsonl`.
    pub fn log_prefix(self) -> String {
        format!("handoff.{}", self.as_str())
    }

    // The launcher prints its own operator lines, so its console only shows problems.
    fn console_directive(self) -> &'static str {
        match self {
            ProcessKind::Launcher => "warn",
            ProcessKind::Queue | ProcessKind::Portal => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// One structured line on the `handoff.obs` target. Unset fields log as empty strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub correlation_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

/// Replaces a secret with its length and a short digest so log lines stay correlatable.
pub fn redact_text(input: &str) -> String {
    match input.trim() {
        "" => String::new(),
        secret => format!("[redacted len={} sha256={}]", secret.len(), short_hash(secret)),
    }
}

/// First 8 bytes of the SHA-256 digest, hex encoded.
pub fn short_hash(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

// `tracing` needs the level as a constant, so each arm expands the same field list.
macro_rules! obs_event {
    ($level:expr, $process:expr, $e:expr) => {
        tracing::event!(
            target: EVENT_TARGET,
            $level,
            process = $process.as_str(),
            component = $e.component,
            event = $e.event,
            correlation_id = $e.correlation_id.unwrap_or(""),
            user_id = $e.user_id.unwrap_or(""),
            request_id = $e.request_id.unwrap_or(""),
            status = $e.status.unwrap_or(""),
            error_code = $e.error_code.unwrap_or(""),
            detail = $e.detail.unwrap_or(""),
            "observability_event"
        )
    };
}

pub fn emit_event(level: Level, process: ProcessKind, event: ObservabilityEvent<'_>) {
    if level == Level::ERROR {
        obs_event!(Level::ERROR, process, event);
    } else if level == Level::WARN {
        obs_event!(Level::WARN, process, event);
    } else {
        obs_event!(Level::INFO, process, event);
    }
}

/// Installs the console and JSONL file layers for `process`.
///
/// Expired files for the same process are removed first. A global subscriber
/// that is already installed is left in place, which keeps tests that call
/// this more than once working.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    let removed = remove_expired_logs(logs_dir, process, retention_days)?;

    let appender = RollingBuilder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(process.log_prefix())
        .filename_suffix(LOG_SUFFIX)
        .build(logs_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);
    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_filter(EnvFilter::new(process.console_directive()));

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if removed > 0 {
        tracing::debug!("removed {removed} expired log file(s) from {}", logs_dir.display());
    }

    Ok((
        guard,
        LoggingInitInfo {
            process: process.as_str().to_string(),
            logs_dir: logs_dir.display().to_string(),
            prefix: process.log_prefix(),
            retention_days,
            initialized_at: Utc::now(),
        },
    ))
}

/// Day stamp of a rotated file belonging to `process`, e.g. `handoff.queue.2024-05-01.jsonl`.
fn rotated_log_date(file_name: &str, process: ProcessKind) -> Option<NaiveDate> {
    let stem = file_name
        .strip_prefix(&process.log_prefix())?
        .strip_prefix('.')?
        .strip_suffix(LOG_SUFFIX)?
        .strip_suffix('.')?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// Deletes this process's rotated files dated before the retention window.
fn remove_expired_logs(
    logs_dir: &Path,
    process: ProcessKind,
    retention_days: u64,
) -> anyhow::Result<usize> {
    let oldest_kept = (Utc::now() - chrono::Duration::days(retention_days as i64)).date_naive();
    let mut removed = 0;

    for entry in fs::read_dir(logs_dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let expired = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| rotated_log_date(name, process))
            .is_some_and(|date| date < oldest_kept);
        if expired && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

/// `<data_dir>/handoff/logs`, or under the temp dir when no data dir is known.
pub fn default_logs_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("handoff")
        .join("logs")
}

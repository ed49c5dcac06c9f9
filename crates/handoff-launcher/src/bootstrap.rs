//! One-time profile bootstrap for RemoteApp-only users.
//!
//! A user who only ever reaches the session through a published app never gets an
//! interactive logon, so some profile folders the console expects are missing.

use std::fs;
use std::path::{Path, PathBuf};

pub const SENTINEL_DIR: &str = "handoff";
pub const SENTINEL_FILE: &str = "profile_bootstrap_v1.done";
const VENDOR_DIRS: [&str; 2] = ["Check Point", "CheckPoint"];

/// Profile locations as seen by the launcher process.
#[derive(Debug, Clone, Default)]
pub struct ProfileEnv {
    pub user_profile: Option<PathBuf>,
    pub app_data: Option<PathBuf>,
    pub local_app_data: Option<PathBuf>,
    pub temp: Option<PathBuf>,
    pub tmp: Option<PathBuf>,
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl ProfileEnv {
    pub fn from_env() -> Self {
        Self {
            user_profile: env_path("USERPROFILE"),
            app_data: env_path("APPDATA"),
            local_app_data: env_path("LOCALAPPDATA"),
            temp: env_path("TEMP"),
            tmp: env_path("TMP"),
        }
    }

    /// `LOCALAPPDATA`, or `<USERPROFILE>/AppData/Local`.
    pub fn resolved_local_app_data(&self) -> Option<PathBuf> {
        self.local_app_data.clone().or_else(|| {
            self.user_profile
                .as_ref()
                .map(|p| p.join("AppData").join("Local"))
        })
    }

    fn folders_to_touch(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for path in [
            &self.user_profile,
            &self.app_data,
            &self.local_app_data,
            &self.temp,
            &self.tmp,
        ]
        .into_iter()
        .flatten()
        {
            out.push(path.clone());
        }
        if let Some(profile) = &self.user_profile {
            out.push(profile.join("Documents"));
        }
        for root in [&self.app_data, &self.local_app_data].into_iter().flatten() {
            for vendor in VENDOR_DIRS {
                out.push(root.join(vendor));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyDone(PathBuf),
    Completed { sentinel: PathBuf, failures: usize },
    /// No local app data folder could be resolved.
    Skipped,
}

pub fn sentinel_path(local_app_data: &Path) -> PathBuf {
    local_app_data.join(SENTINEL_DIR).join(SENTINEL_FILE)
}

fn ensure_dir(path: &Path) -> bool {
    match fs::create_dir_all(path) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("ensure dir failed path='{}' err='{}'", path.display(), err);
            false
        }
    }
}

pub fn bootstrap_user_profile(env: &ProfileEnv) -> BootstrapOutcome {
    let Some(local) = env.resolved_local_app_data() else {
        tracing::warn!("profile bootstrap skipped: no local app data folder");
        return BootstrapOutcome::Skipped;
    };
    let sentinel = sentinel_path(&local);
    if sentinel.exists() {
        tracing::info!("bootstrap already done: {}", sentinel.display());
        return BootstrapOutcome::AlreadyDone(sentinel);
    }

    let mut failures = 0;
    if let Some(parent) = sentinel.parent() {
        if !ensure_dir(parent) {
            failures += 1;
        }
    }
    for folder in env.folders_to_touch() {
        if !ensure_dir(&folder) {
            failures += 1;
        }
    }

    match fs::write(&sentinel, chrono::Local::now().to_rfc3339()) {
        Ok(()) => tracing::info!("bootstrap complete: {}", sentinel.display()),
        Err(err) => {
            failures += 1;
            tracing::warn!("failed writing sentinel {}: {}", sentinel.display(), err);
        }
    }
    BootstrapOutcome::Completed { sentinel, failures }
}

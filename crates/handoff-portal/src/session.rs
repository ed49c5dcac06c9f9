use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use handoff_core::now_ms;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "handoff_session";
const PENDING_LOGIN_TTL_MS: u64 = 10 * 60 * 1000;
pub const SESSION_IDLE_TTL_MS: u64 = 8 * 60 * 60 * 1000;
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    pub created_at_ms: u64,
}

impl PendingLogin {
    pub fn new() -> Self {
        Self {
            state: Uuid::new_v4().simple().to_string(),
            nonce: Uuid::new_v4().simple().to_string(),
            created_at_ms: now_ms(),
        }
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > PENDING_LOGIN_TTL_MS
    }
}

impl Default for PendingLogin {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortalSession {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub id_token: Option<String>,
    pub flashes: Vec<Flash>,
    pub pending_login: Option<PendingLogin>,
    pub last_seen_ms: u64,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, PortalSession>>>,
    secure_cookie: bool,
}

/// Session bound to the current request. `is_new` means the id is not stored yet; it
/// is only stored, and the cookie only set, once something is written to it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    pub is_new: bool,
}

impl SessionStore {
    pub fn new(secure_cookie: bool) -> Self {
        Self {
            sessions: Arc::default(),
            secure_cookie,
        }
    }

    /// Existing session from the cookie, or an unsaved fresh id.
    pub async fn resolve(&self, headers: &HeaderMap) -> SessionHandle {
        if let Some(id) = session_id_from_headers(headers) {
            if let Some(session) = self.sessions.write().await.get_mut(&id) {
                session.last_seen_ms = now_ms();
                return SessionHandle { id, is_new: false };
            }
        }
        SessionHandle {
            id: Uuid::new_v4().simple().to_string(),
            is_new: true,
        }
    }

    pub async fn get(&self, id: &str) -> PortalSession {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Runs `f` on the session, storing it first if needed.
    pub async fn update<R>(&self, id: &str, f: impl FnOnce(&mut PortalSession) -> R) -> R {
        let mut guard = self.sessions.write().await;
        let session = guard.entry(id.to_string()).or_default();
        session.last_seen_ms = now_ms();
        f(session)
    }

    pub async fn flash(&self, id: &str, kind: FlashKind, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |s| s.flashes.push(Flash { kind, message }))
            .await;
    }

    pub async fn take_flashes(&self, id: &str) -> Vec<Flash> {
        self.sessions
            .write()
            .await
            .get_mut(id)
            .map(|s| std::mem::take(&mut s.flashes))
            .unwrap_or_default()
    }

    pub async fn remove(&self, id: &str) -> Option<PortalSession> {
        self.sessions.write().await.remove(id)
    }

    /// Drops sessions idle for longer than `idle_ms`.
    pub async fn purge_idle(&self, now_ms: u64, idle_ms: u64) -> usize {
        let mut guard = self.sessions.write().await;
        let before = guard.len();
        guard.retain(|_, session| now_ms.saturating_sub(session.last_seen_ms) <= idle_ms);
        before - guard.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn cookie_value(&self, id: &str) -> String {
        let mut cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn expired_cookie_value(&self) -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }

    /// Adds `Set-Cookie` when this request stored a new session.
    pub async fn attach(&self, handle: &SessionHandle, mut response: Response) -> Response {
        if handle.is_new && self.sessions.read().await.contains_key(&handle.id) {
            if let Ok(value) = HeaderValue::from_str(&self.cookie_value(&handle.id)) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

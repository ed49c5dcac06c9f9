use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const QUEUED_MESSAGE: &str = "Request queued";

fn mask(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "<set>",
        None => "<none>",
    }
}

/// Body of `POST /api/queue_connection`.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueConnectionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub target_ip: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl fmt::Debug for QueueConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConnectionRequest")
            .field("user_id", &self.user_id)
            .field("target_ip", &self.target_ip)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("target_name", &self.target_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedConnection {
    pub message: String,
    pub id: String,
}

impl QueuedConnection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            message: QUEUED_MESSAGE.to_string(),
            id: id.into(),
        }
    }
}

/// Body returned by `GET /api/fetch_connection` once a request is consumed.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPayload {
    #[serde(default)]
    pub target_ip: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for ConnectionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPayload")
            .field("target_ip", &self.target_ip)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    #[default]
    Pending,
}

/// A queued request as it is held by the store.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub target_ip: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default)]
    pub status: ConnectionStatus,
    /// Seconds the record stays claimable after `created_at_ms`.
    pub ttl: u64,
    pub created_at_ms: u64,
}

impl ConnectionRecord {
    pub fn new(
        user_id: String,
        request: QueueConnectionRequest,
        ttl: u64,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            target_ip: request.target_ip,
            username: request.username,
            password: request.password,
            target_name: request.target_name,
            status: ConnectionStatus::Pending,
            ttl,
            created_at_ms,
        }
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.created_at_ms
            .saturating_add(self.ttl.saturating_mul(1000))
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms()
    }

    pub fn payload(&self) -> ConnectionPayload {
        ConnectionPayload {
            target_ip: self.target_ip.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("target_ip", &self.target_ip)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("target_name", &self.target_name)
            .field("status", &self.status)
            .field("ttl", &self.ttl)
            .field("created_at_ms", &self.created_at_ms)
            .finish()
    }
}

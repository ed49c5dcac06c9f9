use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub target_name: String,
    pub timestamp: String,
    pub status: String,
}

/// Per-user connect history, newest first. Display only; nothing reads it back.
#[derive(Clone, Default)]
pub struct History {
    entries: Arc<RwLock<HashMap<String, Vec<HistoryEntry>>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, user_id: &str, target_name: &str, status: String) {
        let entry = HistoryEntry {
            target_name: target_name.to_string(),
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            status,
        };
        self.entries
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(0, entry);
    }

    pub async fn for_user(&self, user_id: &str) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

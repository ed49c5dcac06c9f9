//! Single-consumer mailbox for queued connection requests.
//!
//! Each user has a FIFO of pending records. A fetch removes the oldest unexpired
//! record under the write lock, so a request is handed out at most once no matter
//! how many launchers poll concurrently. Expired records are never returned and are
//! swept by `purge_expired`.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use handoff_types::{ConnectionRecord, QueueConnectionRequest};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

use crate::normalize_user_id;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn create(&self, record: ConnectionRecord) -> StoreResult<ConnectionRecord>;

    /// Removes and returns the oldest unexpired pending record for `user_id`.
    async fn take_pending(
        &self,
        user_id: &str,
        now_ms: u64,
    ) -> StoreResult<Option<ConnectionRecord>>;

    async fn purge_expired(&self, now_ms: u64) -> StoreResult<usize>;

    async fn pending_count(&self) -> usize;
}

/// Builds a pending record for a validated request. The user id is normalized.
pub fn new_record(
    request: QueueConnectionRequest,
    ttl_secs: u64,
    now_ms: u64,
) -> StoreResult<ConnectionRecord> {
    let raw = request.user_id.clone().unwrap_or_default();
    let user_id = normalize_user_id(&raw).ok_or(StoreError::InvalidUserId(raw))?;
    Ok(ConnectionRecord::new(user_id, request, ttl_secs, now_ms))
}

type Mailboxes = HashMap<String, VecDeque<ConnectionRecord>>;

fn insert(mailboxes: &mut Mailboxes, record: ConnectionRecord) -> StoreResult<ConnectionRecord> {
    let user_id = normalize_user_id(&record.user_id)
        .ok_or_else(|| StoreError::InvalidUserId(record.user_id.clone()))?;
    let record = ConnectionRecord { user_id, ..record };
    mailboxes
        .entry(record.user_id.clone())
        .or_default()
        .push_back(record.clone());
    Ok(record)
}

fn take(mailboxes: &mut Mailboxes, user_id: &str, now_ms: u64) -> Option<ConnectionRecord> {
    let key = normalize_user_id(user_id)?;
    let queue = mailboxes.get_mut(&key)?;
    queue.retain(|record| !record.is_expired(now_ms));
    let taken = queue.pop_front();
    if queue.is_empty() {
        mailboxes.remove(&key);
    }
    taken
}

fn purge(mailboxes: &mut Mailboxes, now_ms: u64) -> usize {
    let mut purged = 0;
    mailboxes.retain(|_, queue| {
        let before = queue.len();
        queue.retain(|record| !record.is_expired(now_ms));
        purged += before - queue.len();
        !queue.is_empty()
    });
    purged
}

fn count(mailboxes: &Mailboxes) -> usize {
    mailboxes.values().map(VecDeque::len).sum()
}

#[derive(Clone, Default)]
pub struct MemoryConnectionStore {
    mailboxes: Arc<RwLock<Mailboxes>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn create(&self, record: ConnectionRecord) -> StoreResult<ConnectionRecord> {
        insert(&mut *self.mailboxes.write().await, record)
    }

    async fn take_pending(
        &self,
        user_id: &str,
        now_ms: u64,
    ) -> StoreResult<Option<ConnectionRecord>> {
        Ok(take(&mut *self.mailboxes.write().await, user_id, now_ms))
    }

    async fn purge_expired(&self, now_ms: u64) -> StoreResult<usize> {
        Ok(purge(&mut *self.mailboxes.write().await, now_ms))
    }

    async fn pending_count(&self) -> usize {
        count(&*self.mailboxes.read().await)
    }
}

/// Memory store that rewrites a JSON snapshot after every mutation.
///
/// Mutations are staged on a copy and only become visible once the snapshot is on
/// disk. The write lock is held across the file write so snapshots land in mutation
/// order.
#[derive(Clone)]
pub struct FileConnectionStore {
    path: PathBuf,
    mailboxes: Arc<RwLock<Mailboxes>>,
}

impl FileConnectionStore {
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mailboxes = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<Mailboxes>(&raw).unwrap_or_else(|err| {
                tracing::warn!(
                    "connection store at {} is unreadable, starting empty: {}",
                    path.display(),
                    err
                );
                Mailboxes::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Mailboxes::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            mailboxes: Arc::new(RwLock::new(mailboxes)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, mailboxes: &Mailboxes) -> StoreResult<()> {
        let payload = serde_json::to_string_pretty(mailboxes)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for FileConnectionStore {
    async fn create(&self, record: ConnectionRecord) -> StoreResult<ConnectionRecord> {
        let mut guard = self.mailboxes.write().await;
        let mut next = guard.clone();
        let record = insert(&mut next, record)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(record)
    }

    async fn take_pending(
        &self,
        user_id: &str,
        now_ms: u64,
    ) -> StoreResult<Option<ConnectionRecord>> {
        let mut guard = self.mailboxes.write().await;
        let mut next = guard.clone();
        let taken = take(&mut next, user_id, now_ms);
        if count(&next) != count(&guard) {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(taken)
    }

    async fn purge_expired(&self, now_ms: u64) -> StoreResult<usize> {
        let mut guard = self.mailboxes.write().await;
        let mut next = guard.clone();
        let purged = purge(&mut next, now_ms);
        if purged > 0 {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(purged)
    }

    async fn pending_count(&self) -> usize {
        count(&*self.mailboxes.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str, target: &str) -> QueueConnectionRequest {
        QueueConnectionRequest {
            user_id: Some(user.to_string()),
            target_ip: Some(target.to_string()),
            username: Some("admin".to_string()),
            password: Some("pw".to_string()),
            target_name: None,
        }
    }

    #[test]
    fn new_record_normalizes_and_rejects_blank_user() {
        let record = new_record(request(" Ops@Example.com", "10.0.0.1"), 60, 0).expect("record");
        assert_eq!(record.user_id, "ops@example.com");

        let err = new_record(request("  ", "10.0.0.1"), 60, 0).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUserId(_)));
    }

    #[tokio::test]
    async fn take_pending_is_fifo_and_consumes_once() {
        let store = MemoryConnectionStore::new();
        store
            .create(new_record(request("u", "10.0.0.1"), 60, 0).expect("record"))
            .await
            .expect("create");
        store
            .create(new_record(request("u", "10.0.0.2"), 60, 1).expect("record"))
            .await
            .expect("create");

        let first = store.take_pending("U", 10).await.expect("take").expect("some");
        let second = store.take_pending("u", 10).await.expect("take").expect("some");
        assert_eq!(first.target_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(second.target_ip.as_deref(), Some("10.0.0.2"));
        assert!(store.take_pending("u", 10).await.expect("take").is_none());
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn expired_records_are_skipped_and_purged() {
        let store = MemoryConnectionStore::new();
        store
            .create(new_record(request("u", "old"), 1, 0).expect("record"))
            .await
            .expect("create");
        store
            .create(new_record(request("v", "old"), 1, 0).expect("record"))
            .await
            .expect("create");
        store
            .create(new_record(request("u", "fresh"), 60, 500).expect("record"))
            .await
            .expect("create");

        let taken = store
            .take_pending("u", 2_000)
            .await
            .expect("take")
            .expect("fresh record");
        assert_eq!(taken.target_ip.as_deref(), Some("fresh"));

        assert_eq!(store.purge_expired(2_000).await.expect("purge"), 1);
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn mailboxes_are_isolated_per_user() {
        let store = MemoryConnectionStore::new();
        store
            .create(new_record(request("alice", "a"), 60, 0).expect("record"))
            .await
            .expect("create");
        assert!(store.take_pending("bob", 1).await.expect("take").is_none());
        assert!(store.take_pending("alice", 1).await.expect("take").is_some());
    }

    #[tokio::test]
    async fn concurrent_fetches_hand_out_one_record() {
        let store = Arc::new(MemoryConnectionStore::new());
        store
            .create(new_record(request("u", "10.0.0.1"), 60, 0).expect("record"))
            .await
            .expect("create");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.take_pending("u", 1).await.expect("take").is_some()
            }));
        }
        let mut hits = 0;
        for handle in handles {
            if handle.await.expect("join") {
                hits += 1;
            }
        }
        assert_eq!(hits, 1);
    }
}

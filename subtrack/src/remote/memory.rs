//! In-process remote store
//!
//! Holds documents in memory and pushes a snapshot to every watcher after
//! each write. Outages and permission failures can be switched on to
//! exercise the sync layer's fallbacks.

use super::{RemoteStore, SnapshotFeed, FEED_CAPACITY};
use crate::database::{FieldChanges, Subscription, SubscriptionFields};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

struct Inner {
    documents: RwLock<BTreeMap<String, SubscriptionFields>>,
    changes: broadcast::Sender<()>,
    next_id: AtomicU64,
    offline: AtomicBool,
    deny_writes: AtomicBool,
    write_count: AtomicU64,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(BTreeMap::new()),
                changes,
                next_id: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                deny_writes: AtomicBool::new(false),
                write_count: AtomicU64::new(0),
            }),
        }
    }

    /// Fail every call with `Unavailable` while set
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        self.notify();
    }

    /// Fail writes with `PermissionDenied` while set
    pub fn set_deny_writes(&self, deny: bool) {
        self.inner.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Number of stored documents, bypassing the failure switches
    pub async fn len(&self) -> usize {
        self.inner.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Successful inserts, updates and deletes so far
    pub fn write_count(&self) -> u64 {
        self.inner.write_count.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("memory remote is offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> RemoteResult<()> {
        self.check_online()?;
        if self.inner.deny_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::PermissionDenied(
                "Missing or insufficient permissions.".to_string(),
            ));
        }
        Ok(())
    }

    fn notify(&self) {
        // No receivers is fine
        let _ = self.inner.changes.send(());
    }

    fn record_write(&self) {
        self.inner.write_count.fetch_add(1, Ordering::SeqCst);
        self.notify();
    }

    async fn snapshot(&self) -> Vec<Subscription> {
        let docs = self.inner.documents.read().await;
        let mut subs: Vec<Subscription> = docs
            .iter()
            .map(|(id, fields)| Subscription::from_fields(id.clone(), fields.clone()))
            .collect();
        subs.sort_by(|a, b| a.end_date.cmp(&b.end_date).then_with(|| a.id.cmp(&b.id)));
        subs
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list_ordered(&self) -> RemoteResult<Vec<Subscription>> {
        self.check_online()?;
        Ok(self.snapshot().await)
    }

    async fn insert(&self, fields: &SubscriptionFields) -> RemoteResult<String> {
        self.check_writable()?;

        let id = format!("doc-{:06}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner
            .documents
            .write()
            .await
            .insert(id.clone(), fields.clone());

        self.record_write();
        Ok(id)
    }

    async fn update(&self, id: &str, changes: &FieldChanges) -> RemoteResult<()> {
        self.check_writable()?;

        {
            let mut docs = self.inner.documents.write().await;
            let doc = docs
                .get_mut(id)
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
            doc.apply_changes(changes)
                .map_err(RemoteError::InvalidResponse)?;
        }

        self.record_write();
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.check_writable()?;

        // Deleting a missing document succeeds, as in Firestore
        self.inner.documents.write().await.remove(id);

        self.record_write();
        Ok(())
    }

    async fn watch(&self) -> RemoteResult<SnapshotFeed> {
        self.check_online()?;

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let mut changes = self.inner.changes.subscribe();
        let remote = self.clone();

        tokio::spawn(async move {
            loop {
                let message = match remote.check_online() {
                    Ok(()) => Ok(remote.snapshot().await),
                    Err(e) => Err(e),
                };

                if tx.send(message).await.is_err() {
                    break;
                }

                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}

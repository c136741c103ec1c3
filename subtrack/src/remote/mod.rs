//! Remote document store
//!
//! The authoritative copy of the subscription collection. [`RemoteStore`] is
//! the seam the sync layer talks through; [`FirestoreClient`] speaks the
//! Firestore REST API and [`MemoryRemote`] keeps everything in process.

pub mod codec;
pub mod firestore;
pub mod memory;

pub use firestore::FirestoreClient;
pub use memory::MemoryRemote;

use crate::database::{FieldChanges, Subscription, SubscriptionFields};
use crate::error::RemoteResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Capacity of a snapshot feed before the producer waits
pub const FEED_CAPACITY: usize = 16;

/// Ordered snapshots of the whole collection, or the error that interrupted them
pub type SnapshotFeed = mpsc::Receiver<RemoteResult<Vec<Subscription>>>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every document, ordered by end date ascending
    async fn list_ordered(&self) -> RemoteResult<Vec<Subscription>>;

    /// Create a document and return its store-assigned id
    async fn insert(&self, fields: &SubscriptionFields) -> RemoteResult<String>;

    /// Overwrite the named fields of an existing document
    async fn update(&self, id: &str, changes: &FieldChanges) -> RemoteResult<()>;

    async fn delete(&self, id: &str) -> RemoteResult<()>;

    /// Start a change feed; it ends when the receiver is dropped
    async fn watch(&self) -> RemoteResult<SnapshotFeed>;
}

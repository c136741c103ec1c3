//! Subscription sync service
//!
//! One CRUD surface over two stores: the remote document store is the source
//! of truth and the local mirror is its cache and fallback. Remote failures
//! never reach callers. They degrade to mirror-only behavior, and a
//! permission failure while adding also raises an [`Alert`].

use super::notifier::{Alert, Notifier};
use crate::config::DEFAULT_LOCAL_POLL_INTERVAL_MS;
use crate::database::{NewSubscription, Subscription, SubscriptionPatch};
use crate::dates::Clock;
use crate::error::{AppError, RemoteError, RemoteResult, Result};
use crate::remote::{RemoteStore, SnapshotFeed, FEED_CAPACITY};
use crate::storage::LocalMirror;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone)]
pub struct SyncService {
    mirror: LocalMirror,
    remote: Option<Arc<dyn RemoteStore>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    local_poll_interval: Duration,
}

impl SyncService {
    /// `remote` is `None` when no remote store is configured
    pub fn new(
        mirror: LocalMirror,
        remote: Option<Arc<dyn RemoteStore>>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mirror,
            remote,
            notifier,
            clock,
            local_poll_interval: Duration::from_millis(DEFAULT_LOCAL_POLL_INTERVAL_MS),
        }
    }

    /// Interval at which `watch` polls the mirror without a remote feed
    pub fn with_local_poll_interval(mut self, interval: Duration) -> Self {
        self.local_poll_interval = interval;
        self
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// All subscriptions ordered by end date
    pub async fn list(&self) -> Vec<Subscription> {
        if let Some(remote) = &self.remote {
            match self.list_remote(remote.as_ref()).await {
                Ok(subs) => return subs,
                Err(e) => {
                    log_remote_failure("list", &e);
                    tracing::info!("Falling back to local mirror");
                }
            }
        } else {
            tracing::debug!("Remote store not configured, reading local mirror");
        }

        let subs = self.mirror.load().await;
        tracing::debug!("Loaded {} subscriptions from local mirror", subs.len());
        subs
    }

    async fn list_remote(&self, remote: &dyn RemoteStore) -> RemoteResult<Vec<Subscription>> {
        let mut subs = remote.list_ordered().await?;
        tracing::debug!("Loaded {} subscriptions from remote store", subs.len());

        let local_count = self.mirror.load_for_migration().await.len();
        if local_count > subs.len() {
            tracing::info!(
                "Local mirror has {} subscriptions, remote has {}; attempting migration",
                local_count,
                subs.len()
            );

            if self.migrate().await {
                subs = remote.list_ordered().await?;
                tracing::info!("Loaded {} subscriptions after migration", subs.len());
            }
        }

        // An empty result must not wipe records that only exist locally
        if !subs.is_empty() {
            if let Err(e) = self.mirror.save_snapshot(&subs).await {
                tracing::error!("Failed to refresh local mirror: {}", e);
            }
        }

        Ok(subs)
    }

    /// Stream of ordered snapshots until the handle is dropped
    pub async fn watch(&self) -> WatchHandle {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);

        let task = match &self.remote {
            Some(remote) => match remote.watch().await {
                Ok(feed) => {
                    tracing::info!("Watching remote store for changes");
                    self.spawn_feed_forwarder(feed, tx)
                }
                Err(e) => {
                    log_remote_failure("watch", &e);
                    self.spawn_mirror_poller(tx)
                }
            },
            None => {
                tracing::info!("Remote store not configured, polling local mirror");
                self.spawn_mirror_poller(tx)
            }
        };

        WatchHandle { rx, task }
    }

    fn spawn_feed_forwarder(
        &self,
        mut feed: SnapshotFeed,
        tx: mpsc::Sender<Vec<Subscription>>,
    ) -> JoinHandle<()> {
        let service = self.clone();

        tokio::spawn(async move {
            while let Some(message) = feed.recv().await {
                let snapshot = match message {
                    Ok(snapshot) => {
                        tracing::debug!("Remote snapshot: {} subscriptions", snapshot.len());
                        if let Err(e) = service.mirror.save_snapshot(&snapshot).await {
                            tracing::error!("Failed to refresh local mirror: {}", e);
                        }
                        snapshot
                    }
                    Err(e) => {
                        log_remote_failure("watch", &e);
                        service.mirror.load().await
                    }
                };

                if tx.send(snapshot).await.is_err() {
                    return;
                }
            }

            tracing::warn!("Remote change feed ended, polling local mirror instead");
            service.poll_mirror(tx).await;
        })
    }

    fn spawn_mirror_poller(&self, tx: mpsc::Sender<Vec<Subscription>>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.poll_mirror(tx).await })
    }

    async fn poll_mirror(&self, tx: mpsc::Sender<Vec<Subscription>>) {
        let mut interval = tokio::time::interval(self.local_poll_interval);

        loop {
            interval.tick().await;
            if tx.send(self.mirror.load().await).await.is_err() {
                tracing::debug!("Mirror poller stopped");
                return;
            }
        }
    }

    /// Create a subscription; the end date is derived here
    pub async fn add(&self, new: NewSubscription) -> Result<Subscription> {
        new.validate()?;
        let fields = new.into_fields(self.clock.now());

        tracing::info!(
            "Adding subscription {} for {}",
            fields.subscription_name,
            fields.person_name
        );

        if let Some(remote) = &self.remote {
            match remote.insert(&fields).await {
                Ok(id) => {
                    let sub = Subscription::from_fields(id, fields);
                    if let Err(e) = self.mirror.append(sub.clone()).await {
                        tracing::error!("Saved {} remotely but not to the mirror: {}", sub.id, e);
                    }
                    tracing::info!("Subscription added to remote store: {}", sub.id);
                    return Ok(sub);
                }
                Err(e) => {
                    log_remote_failure("add", &e);
                    if let RemoteError::PermissionDenied(detail) = &e {
                        self.notifier.alert(Alert::permission_denied(detail));
                    }
                }
            }
        }

        let sub = Subscription::from_fields(Uuid::now_v7().to_string(), fields);
        self.mirror.append(sub.clone()).await?;

        tracing::info!("Subscription added to local mirror: {}", sub.id);
        Ok(sub)
    }

    /// Apply a partial update, remote store first and then the mirror.
    /// `None` when the id is not in the mirror, even if the remote copy
    /// was updated.
    pub async fn update(&self, id: &str, patch: SubscriptionPatch) -> Option<Subscription> {
        if let Err(e) = patch.validate() {
            tracing::warn!("Rejected update for {}: {}", id, e);
            return None;
        }

        let current = self.mirror.find(id).await;

        let remote_ok = match &self.remote {
            Some(remote) => self.push_update(remote.as_ref(), id, &patch, current.as_ref()).await,
            None => false,
        };

        let Some(current) = current else {
            tracing::warn!("Subscription {} not found in local mirror", id);
            return None;
        };

        let updated = patch.apply_to(&current);
        match self.mirror.replace(&updated).await {
            Ok(true) => {
                tracing::debug!("Updated subscription: {}", id);
                Some(updated)
            }
            Ok(false) => {
                tracing::warn!("Subscription {} left the local mirror during update", id);
                None
            }
            Err(e) => {
                tracing::error!("Failed to update {} in local mirror: {}", id, e);
                remote_ok.then_some(updated)
            }
        }
    }

    /// Send a patch to the remote store. Schedule changes need the stored
    /// record to derive the end date; without a mirror copy it is read from
    /// the remote store.
    async fn push_update(
        &self,
        remote: &dyn RemoteStore,
        id: &str,
        patch: &SubscriptionPatch,
        current: Option<&Subscription>,
    ) -> bool {
        let changes = match current {
            Some(current) => patch.field_changes(&patch.apply_to(current)),
            None if !patch.changes_schedule() => patch.text_changes(),
            None => match remote.list_ordered().await {
                Ok(subs) => match subs.iter().find(|s| s.id == id) {
                    Some(stored) => patch.field_changes(&patch.apply_to(stored)),
                    None => {
                        tracing::warn!("Subscription {} not found in remote store", id);
                        return false;
                    }
                },
                Err(e) => {
                    log_remote_failure("update", &e);
                    return false;
                }
            },
        };

        if changes.is_empty() {
            return true;
        }

        match remote.update(id, &changes).await {
            Ok(()) => {
                tracing::debug!("Updated {} in remote store", id);
                true
            }
            Err(e) => {
                log_remote_failure("update", &e);
                false
            }
        }
    }

    /// Remove a subscription from both stores; failures are only logged
    pub async fn delete(&self, id: &str) {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(id).await {
                log_remote_failure("delete", &e);
            }
        }

        match self.mirror.remove(id).await {
            Ok(true) => tracing::info!("Deleted subscription: {}", id),
            Ok(false) => tracing::debug!("Subscription {} was not in the local mirror", id),
            Err(e) => tracing::error!("Failed to delete {} from local mirror: {}", id, e),
        }
    }

    /// Copy mirror-only records to the remote store.
    ///
    /// Runs only while the mirror holds more records than the remote. Records
    /// are matched by content key, so running it again copies nothing.
    /// Returns whether anything was copied.
    pub async fn migrate(&self) -> bool {
        let Some(remote) = &self.remote else {
            tracing::debug!("Remote store not configured, nothing to migrate to");
            return false;
        };

        let local = self.mirror.load_for_migration().await;
        if local.is_empty() {
            tracing::debug!("No mirrored subscriptions to migrate");
            return false;
        }

        let existing = match remote.list_ordered().await {
            Ok(existing) => existing,
            Err(e) => {
                log_remote_failure("migrate", &e);
                return false;
            }
        };

        if existing.len() >= local.len() {
            tracing::info!(
                "Remote already holds {} subscriptions (mirror has {}), skipping migration",
                existing.len(),
                local.len()
            );
            return false;
        }

        let mut known: HashSet<String> = existing.iter().map(Subscription::content_key).collect();
        let mut migrated = 0usize;
        let mut skipped = 0usize;

        for sub in &local {
            let key = sub.content_key();
            if known.contains(&key) {
                skipped += 1;
                continue;
            }

            match remote.insert(&sub.fields()).await {
                Ok(id) => {
                    tracing::debug!("Migrated {} as {}", sub.id, id);
                    known.insert(key);
                    migrated += 1;
                }
                Err(e) if e.is_permission_denied() => {
                    log_remote_failure("migrate", &e);
                    break;
                }
                Err(e) => log_remote_failure("migrate", &e),
            }
        }

        tracing::info!(
            "Migration finished: {} copied, {} already present",
            migrated,
            skipped
        );
        migrated > 0
    }

    /// Insert every valid entry of a JSON array via `add`; ids are ignored
    pub async fn import_json(&self, json: &str) -> Result<ImportReport> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Array(entries) = value else {
            return Err(AppError::Validation(
                "import file must contain a JSON array".to_string(),
            ));
        };

        let mut report = ImportReport::default();

        for (index, entry) in entries.into_iter().enumerate() {
            let result = serde_json::from_value::<NewSubscription>(entry)
                .map_err(AppError::from)
                .and_then(|new| new.validate().map(|_| new));

            let new = match result {
                Ok(new) => new,
                Err(e) => {
                    tracing::warn!("Skipping import entry {}: {}", index, e);
                    report.skipped.push(format!("entry {}: {}", index, e));
                    continue;
                }
            };

            match self.add(new).await {
                Ok(sub) => report.imported.push(sub.id),
                Err(e) => report.skipped.push(format!("entry {}: {}", index, e)),
            }
        }

        tracing::info!(
            "Imported {} subscriptions ({} skipped)",
            report.imported.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Current list as pretty JSON
    pub async fn export_json(&self) -> Result<String> {
        let subs = self.list().await;
        Ok(serde_json::to_string_pretty(&subs)?)
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Ids of the created records
    pub imported: Vec<String>,
    /// One message per rejected entry
    pub skipped: Vec<String>,
}

/// Live subscription to ordered snapshots. Dropping it stops the feed.
pub struct WatchHandle {
    rx: mpsc::Receiver<Vec<Subscription>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Next snapshot; `None` once the feed has stopped
    pub async fn next(&mut self) -> Option<Vec<Subscription>> {
        self.rx.recv().await
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the feed
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn log_remote_failure(operation: &str, err: &RemoteError) {
    match err {
        RemoteError::PermissionDenied(_) => tracing::error!(
            "Remote {} denied: {}. Check the store's access rules.",
            operation,
            err
        ),
        RemoteError::NotConfigured => {
            tracing::debug!("Remote {} skipped: {}", operation, err)
        }
        _ => tracing::warn!("Remote {} failed: {}", operation, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIRROR_KEY;
    use crate::database::{SubscriptionDuration, SubscriptionFields};
    use crate::dates::{calculate_end_date, FixedClock};
    use crate::remote::MemoryRemote;
    use crate::services::notifier::{AlertKind, ChannelNotifier, TracingNotifier};
    use chrono::NaiveDate;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::on(date("2025-02-10")))
    }

    fn new_sub(person: &str, service: &str, start: &str) -> NewSubscription {
        NewSubscription {
            person_name: person.to_string(),
            subscription_name: service.to_string(),
            category: "Streaming".to_string(),
            start_date: date(start),
            duration: SubscriptionDuration::Month,
        }
    }

    fn local_record(id: &str, person: &str) -> Subscription {
        let fields: SubscriptionFields =
            new_sub(person, "Netflix", "2025-01-15").into_fields(chrono::Utc::now());
        Subscription::from_fields(id, fields)
    }

    fn service_with(remote: Option<MemoryRemote>) -> SyncService {
        let remote = remote.map(|r| Arc::new(r) as Arc<dyn RemoteStore>);
        SyncService::new(
            LocalMirror::in_memory(),
            remote,
            Arc::new(TracingNotifier),
            clock(),
        )
        .with_local_poll_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_add_then_list_includes_derived_end_date() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let added = service
            .add(new_sub("Sara", "Netflix", "2025-01-15"))
            .await
            .unwrap();
        assert!(added.id.starts_with("doc-"));
        assert_eq!(added.created_at, clock().now());

        let listed = service.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, added.id);
        assert_eq!(
            listed[0].end_date,
            calculate_end_date(date("2025-01-15"), SubscriptionDuration::Month)
        );
        assert_eq!(service.mirror().load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_blank_fields() {
        let service = service_with(None);
        let mut new = new_sub("Sara", "Netflix", "2025-01-15");
        new.category = " ".to_string();

        assert!(matches!(service.add(new).await, Err(AppError::Validation(_))));
        assert!(service.mirror().load().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_falls_back_to_mirror_when_remote_offline() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let service = service_with(Some(remote.clone()));

        let added = service
            .add(new_sub("Sara", "Netflix", "2025-01-15"))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&added.id).is_ok());
        assert!(remote.is_empty().await);

        let listed = service.list().await;
        assert_eq!(listed, vec![added]);
    }

    #[tokio::test]
    async fn test_permission_denied_add_raises_alert() {
        let remote = MemoryRemote::new();
        remote.set_deny_writes(true);
        let (notifier, mut alerts) = ChannelNotifier::new();
        let service = SyncService::new(
            LocalMirror::in_memory(),
            Some(Arc::new(remote.clone())),
            Arc::new(notifier),
            clock(),
        );

        let added = service
            .add(new_sub("Sara", "Netflix", "2025-01-15"))
            .await
            .unwrap();

        let alert = alerts.try_recv().unwrap();
        assert_eq!(alert.kind, AlertKind::PermissionDenied);
        assert_eq!(service.mirror().find(&added.id).await, Some(added));
    }

    #[tokio::test]
    async fn test_offline_add_raises_no_alert() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let (notifier, mut alerts) = ChannelNotifier::new();
        let service = SyncService::new(
            LocalMirror::in_memory(),
            Some(Arc::new(remote)),
            Arc::new(notifier),
            clock(),
        );

        service
            .add(new_sub("Sara", "Netflix", "2025-01-15"))
            .await
            .unwrap();
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_local_only_crud() {
        let service = service_with(None);
        assert!(!service.is_remote_configured());

        let a = service.add(new_sub("Sara", "Netflix", "2025-03-01")).await.unwrap();
        let b = service.add(new_sub("Omar", "Spotify", "2025-01-01")).await.unwrap();
        assert_ne!(a.id, b.id);

        let updated = service
            .update(
                &a.id,
                SubscriptionPatch {
                    duration: Some(SubscriptionDuration::Year),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.end_date, date("2026-03-01"));
        assert_eq!(updated.created_at, a.created_at);

        service.delete(&b.id).await;
        let remaining = service.list().await;
        assert_eq!(remaining, vec![updated]);
    }

    #[tokio::test]
    async fn test_update_propagates_to_remote() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let added = service.add(new_sub("Sara", "Netflix", "2025-01-15")).await.unwrap();
        let updated = service
            .update(
                &added.id,
                SubscriptionPatch {
                    start_date: Some(date("2025-02-01")),
                    category: Some("Video".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.end_date, date("2025-03-01"));

        let remote_copy = remote.list_ordered().await.unwrap();
        assert_eq!(remote_copy[0].category, "Video");
        assert_eq!(remote_copy[0].end_date, date("2025-03-01"));
        assert_eq!(remote_copy[0].created_at, added.created_at);
    }

    #[tokio::test]
    async fn test_update_with_remote_offline_still_updates_mirror() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));
        let added = service.add(new_sub("Sara", "Netflix", "2025-01-15")).await.unwrap();

        remote.set_offline(true);
        let updated = service
            .update(
                &added.id,
                SubscriptionPatch {
                    person_name: Some("Sara K.".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(updated.unwrap().person_name, "Sara K.");
        assert_eq!(service.mirror().find(&added.id).await.unwrap().person_name, "Sara K.");
    }

    #[tokio::test]
    async fn test_update_unknown_id_returns_none() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let result = service
            .update(
                "missing",
                SubscriptionPatch {
                    category: Some("Music".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(result.is_none());
        assert!(remote.is_empty().await);
        assert!(service.mirror().load().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_reaches_remote_record_missing_from_mirror() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let fields = new_sub("Sara", "Netflix", "2025-01-15").into_fields(chrono::Utc::now());
        let id = remote.insert(&fields).await.unwrap();

        let result = service
            .update(
                &id,
                SubscriptionPatch {
                    category: Some("Music".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(result.is_none());
        let stored = remote.list_ordered().await.unwrap();
        assert_eq!(stored[0].category, "Music");
        assert_eq!(stored[0].end_date, date("2025-02-15"));
    }

    #[tokio::test]
    async fn test_schedule_update_for_remote_only_record_recomputes_end_date() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let fields = new_sub("Omar", "Spotify", "2025-01-15").into_fields(chrono::Utc::now());
        let id = remote.insert(&fields).await.unwrap();

        let result = service
            .update(
                &id,
                SubscriptionPatch {
                    duration: Some(SubscriptionDuration::SixMonths),
                    ..Default::default()
                },
            )
            .await;

        assert!(result.is_none());
        let stored = remote.list_ordered().await.unwrap();
        assert_eq!(stored[0].duration, SubscriptionDuration::SixMonths);
        assert_eq!(stored[0].end_date, date("2025-07-15"));
    }

    #[tokio::test]
    async fn test_delete_unknown_id_on_empty_mirror() {
        let service = service_with(Some(MemoryRemote::new()));

        service.delete("does-not-exist").await;

        assert_eq!(service.mirror().load().await.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_with_remote_offline_removes_locally() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));
        let added = service.add(new_sub("Sara", "Netflix", "2025-01-15")).await.unwrap();

        remote.set_offline(true);
        service.delete(&added.id).await;

        assert!(service.mirror().load().await.is_empty());
        assert_eq!(remote.len().await, 1);
    }

    #[tokio::test]
    async fn test_deleted_record_stays_deleted() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let added = service.add(new_sub("Sara", "Netflix", "2025-01-15")).await.unwrap();
        assert_eq!(service.list().await.len(), 1);

        service.delete(&added.id).await;
        assert_eq!(remote.len().await, 0);

        assert!(service.list().await.is_empty());
        assert_eq!(remote.len().await, 0);
        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_keeps_mirror_records_with_timestamped_dates() {
        let service = service_with(None);

        let legacy = serde_json::json!({
            "id": "1700000000000",
            "personName": "Noor",
            "subscriptionName": "Spotify",
            "category": "Music",
            "startDate": "2025-01-15T00:00:00.000Z",
            "duration": "month",
            "endDate": "2025-02-15T00:00:00.000Z"
        });
        let raw = serde_json::json!([
            serde_json::to_value(local_record("A", "Sara")).unwrap(),
            serde_json::to_value(local_record("B", "Omar")).unwrap(),
            legacy
        ]);
        service.mirror().write_raw(MIRROR_KEY, &raw.to_string()).await.unwrap();

        let d = service.add(new_sub("Lina", "Netflix", "2025-02-01")).await.unwrap();

        let ids: Vec<String> = service.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["A".to_string(), "B".to_string(), "1700000000000".to_string(), d.id]);
    }

    #[tokio::test]
    async fn test_list_migrates_local_records_once() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let local: Vec<Subscription> = (1..=5)
            .map(|i| local_record(&format!("17000000000{}", i), &format!("Person {}", i)))
            .collect();
        service.mirror().save(&local).await.unwrap();

        let listed = service.list().await;
        assert_eq!(listed.len(), 5);
        assert_eq!(remote.len().await, 5);
        assert!(listed.iter().all(|s| s.id.starts_with("doc-")));

        let writes = remote.write_count();
        let again = service.list().await;
        assert_eq!(again.len(), 5);
        assert_eq!(remote.write_count(), writes);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let local: Vec<Subscription> = (1..=3)
            .map(|i| local_record(&i.to_string(), &format!("Person {}", i)))
            .collect();
        service.mirror().save(&local).await.unwrap();

        assert!(service.migrate().await);
        let after_first = remote.len().await;

        assert!(!service.migrate().await);
        assert_eq!(remote.len().await, after_first);
        assert_eq!(after_first, 3);
    }

    #[tokio::test]
    async fn test_migrate_skips_records_already_remote() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let local: Vec<Subscription> = (1..=4)
            .map(|i| local_record(&i.to_string(), &format!("Person {}", i)))
            .collect();
        remote.insert(&local[0].fields()).await.unwrap();
        remote.insert(&local[1].fields()).await.unwrap();
        service.mirror().save(&local).await.unwrap();

        assert!(service.migrate().await);
        assert_eq!(remote.len().await, 4);
    }

    #[tokio::test]
    async fn test_migrate_stops_on_permission_denied() {
        let remote = MemoryRemote::new();
        remote.set_deny_writes(true);
        let service = service_with(Some(remote.clone()));

        service
            .mirror()
            .save(&[local_record("1", "Sara"), local_record("2", "Omar")])
            .await
            .unwrap();

        assert!(!service.migrate().await);
        assert!(remote.is_empty().await);

        // Mirror is kept when the remote stays empty
        assert_eq!(service.list().await.len(), 0);
        assert_eq!(service.mirror().load().await.len(), 2);
    }

    #[tokio::test]
    async fn test_list_with_corrupt_mirror_and_no_remote() {
        let service = service_with(None);
        service.mirror().write_raw(MIRROR_KEY, "{{{").await.unwrap();

        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_watch_remote_snapshots_refresh_mirror() {
        let remote = MemoryRemote::new();
        let service = service_with(Some(remote.clone()));

        let mut handle = service.watch().await;
        let first = timeout(WAIT, handle.next()).await.unwrap().unwrap();
        assert!(first.is_empty());

        remote
            .insert(&new_sub("Sara", "Netflix", "2025-01-15").into_fields(chrono::Utc::now()))
            .await
            .unwrap();

        let second = timeout(WAIT, handle.next()).await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(service.mirror().load().await, second);

        handle.unsubscribe();
    }

    #[tokio::test]
    async fn test_watch_without_remote_polls_mirror() {
        let service = service_with(None);
        let mut handle = service.watch().await;

        let first = timeout(WAIT, handle.next()).await.unwrap().unwrap();
        assert!(first.is_empty());

        service.add(new_sub("Sara", "Netflix", "2025-01-15")).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen = timeout(WAIT, handle.next()).await.unwrap().unwrap();
            if !seen.is_empty() {
                break;
            }
        }
        assert_eq!(seen.len(), 1);
        assert!(handle.is_active());
    }

    #[tokio::test]
    async fn test_watch_falls_back_when_remote_unreachable() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let service = service_with(Some(remote));
        service.mirror().save(&[local_record("1", "Sara")]).await.unwrap();

        let mut handle = service.watch().await;
        let snapshot = timeout(WAIT, handle.next()).await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_watch_reports_inactive() {
        let service = service_with(None);
        let mut handle = service.watch().await;
        timeout(WAIT, handle.next()).await.unwrap().unwrap();

        handle.task.abort();
        let _ = (&mut handle.task).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_import_skips_invalid_entries() {
        let service = service_with(Some(MemoryRemote::new()));
        let json = r#"[
            {"id": "old-1", "personName": "Sara", "subscriptionName": "Netflix", "category": "Streaming",
             "startDate": "2025-01-15", "duration": "month", "endDate": "1999-01-01"},
            {"personName": "Omar", "subscriptionName": "Spotify", "category": "Music",
             "startDate": "2025-01-01", "duration": "year"},
            {"personName": "", "subscriptionName": "Hulu", "category": "Streaming",
             "startDate": "2025-01-01", "duration": "month"},
            {"personName": "Lina", "subscriptionName": "Disney+", "category": "Streaming",
             "startDate": "2025-01-01", "duration": "weekly"}
        ]"#;

        let report = service.import_json(json).await.unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.skipped.len(), 2);

        let listed = service.list().await;
        let sara = listed.iter().find(|s| s.person_name == "Sara").unwrap();
        assert_ne!(sara.id, "old-1");
        assert_eq!(sara.end_date, date("2025-02-15"));
    }

    #[tokio::test]
    async fn test_import_rejects_non_array() {
        let service = service_with(None);
        let result = service.import_json(r#"{"personName": "Sara"}"#).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_export_lists_records() {
        let service = service_with(None);
        service.add(new_sub("Sara", "Netflix", "2025-01-15")).await.unwrap();

        let json = service.export_json().await.unwrap();
        let parsed: Vec<Subscription> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].end_date, date("2025-02-15"));
    }
}

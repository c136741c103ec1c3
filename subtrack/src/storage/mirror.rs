//! Local mirror of the subscription list
//!
//! The list is stored as one JSON array under [`MIRROR_KEY`], with a second
//! copy under [`MIRROR_BACKUP_KEY`] refreshed from every remote snapshot.
//! Reads never fail: records that cannot be decoded are logged and skipped,
//! and a key that is not a JSON array at all is treated as missing.
//!
//! Writes are lossless. Undecodable records are carried over into the new
//! array, and a key holding something other than an array is copied to
//! `<key>_unreadable` before it is replaced.

use super::kv::{KeyValueStore, MemoryKeyValueStore};
use crate::config::{LEGACY_MIRROR_KEY, MIRROR_BACKUP_KEY, MIRROR_KEY};
use crate::database::Subscription;
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Decoded contents of one mirror key
struct StoredList {
    records: Vec<Subscription>,
    /// Array elements that are not valid subscriptions, kept as stored
    unreadable: Vec<Value>,
}

#[derive(Clone)]
pub struct LocalMirror {
    store: Arc<dyn KeyValueStore>,
}

impl LocalMirror {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Mirror backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Current mirror contents: primary key, else the backup copy
    pub async fn load(&self) -> Vec<Subscription> {
        for key in [MIRROR_KEY, MIRROR_BACKUP_KEY] {
            if let Some(list) = self.read_key(key).await {
                return list.records;
            }
        }

        Vec::new()
    }

    /// Records eligible for migration; also looks at the legacy key.
    /// The first readable key wins, even when it holds an empty list.
    pub async fn load_for_migration(&self) -> Vec<Subscription> {
        for key in [MIRROR_KEY, MIRROR_BACKUP_KEY, LEGACY_MIRROR_KEY] {
            if let Some(list) = self.read_key(key).await {
                tracing::debug!(
                    "Found {} mirrored subscriptions under '{}'",
                    list.records.len(),
                    key
                );
                return list.records;
            }
        }

        Vec::new()
    }

    /// Overwrite the primary copy
    pub async fn save(&self, subscriptions: &[Subscription]) -> Result<()> {
        self.write_key(MIRROR_KEY, subscriptions).await
    }

    /// Overwrite both the primary and backup copies
    pub async fn save_snapshot(&self, subscriptions: &[Subscription]) -> Result<()> {
        self.write_key(MIRROR_BACKUP_KEY, subscriptions).await?;
        self.write_key(MIRROR_KEY, subscriptions).await
    }

    /// Append one record
    pub async fn append(&self, subscription: Subscription) -> Result<()> {
        let mut subs = self.load().await;
        subs.push(subscription);
        self.commit(&subs).await
    }

    /// Replace the record with the same id; false when absent
    pub async fn replace(&self, subscription: &Subscription) -> Result<bool> {
        let mut subs = self.load().await;

        let Some(slot) = subs.iter_mut().find(|s| s.id == subscription.id) else {
            return Ok(false);
        };
        *slot = subscription.clone();

        self.commit(&subs).await?;
        Ok(true)
    }

    /// Remove the record with `id`; false when absent
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut subs = self.load().await;
        let before = subs.len();
        subs.retain(|s| s.id != id);

        if subs.len() == before {
            return Ok(false);
        }

        self.commit(&subs).await?;
        Ok(true)
    }

    pub async fn find(&self, id: &str) -> Option<Subscription> {
        self.load().await.into_iter().find(|s| s.id == id)
    }

    /// Write raw text under a key, bypassing serialization
    pub async fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value).await
    }

    /// Raw text stored under a key
    pub async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key).await
    }

    /// Persist a local edit to the primary key, and to the backup when one
    /// exists so that neither copy can resurrect removed records
    async fn commit(&self, subscriptions: &[Subscription]) -> Result<()> {
        self.write_key(MIRROR_KEY, subscriptions).await?;

        if self.store.get(MIRROR_BACKUP_KEY).await?.is_some() {
            self.write_key(MIRROR_BACKUP_KEY, subscriptions).await?;
        }

        Ok(())
    }

    async fn write_key(&self, key: &str, subscriptions: &[Subscription]) -> Result<()> {
        let mut values = subscriptions
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;

        if let Some(raw) = self.store.get(key).await? {
            match decode_list(key, &raw) {
                Some(existing) => values.extend(existing.unreadable),
                None => self.set_aside(key, &raw).await?,
            }
        }

        self.store.set(key, &serde_json::to_string(&values)?).await
    }

    /// Keep the text of an unreadable key before it gets replaced
    async fn set_aside(&self, key: &str, raw: &str) -> Result<()> {
        let aside = format!("{}_unreadable", key);
        tracing::warn!("Moving unreadable mirror key '{}' to '{}'", key, aside);

        let kept = match self.store.get(&aside).await? {
            Some(previous) => format!("{}\n{}", previous, raw),
            None => raw.to_string(),
        };
        self.store.set(&aside, &kept).await
    }

    async fn read_key(&self, key: &str) -> Option<StoredList> {
        match self.store.get(key).await {
            Ok(Some(raw)) => decode_list(key, &raw),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Failed to read mirror key '{}': {}", key, e);
                None
            }
        }
    }
}

/// Decode a stored array record by record; None when it is not an array
fn decode_list(key: &str, raw: &str) -> Option<StoredList> {
    let values = match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Mirror key '{}' holds unreadable data, ignoring it: {}", key, e);
            return None;
        }
    };

    let mut list = StoredList {
        records: Vec::with_capacity(values.len()),
        unreadable: Vec::new(),
    };

    for value in values {
        match Subscription::deserialize(&value) {
            Ok(sub) => list.records.push(sub),
            Err(e) => {
                tracing::warn!("Skipping unreadable record in mirror key '{}': {}", key, e);
                list.unreadable.push(value);
            }
        }
    }

    Some(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{NewSubscription, SubscriptionDuration};
    use chrono::{NaiveDate, Utc};

    fn sub(id: &str, person: &str) -> Subscription {
        let fields = NewSubscription {
            person_name: person.to_string(),
            subscription_name: "Netflix".to_string(),
            category: "Streaming".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            duration: SubscriptionDuration::Month,
        }
        .into_fields(Utc::now());
        Subscription::from_fields(id, fields)
    }

    #[tokio::test]
    async fn test_empty_mirror_loads_nothing() {
        let mirror = LocalMirror::in_memory();
        assert!(mirror.load().await.is_empty());
        assert!(mirror.load_for_migration().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_replace_remove() {
        let mirror = LocalMirror::in_memory();

        mirror.append(sub("1", "Sara")).await.unwrap();
        mirror.append(sub("2", "Omar")).await.unwrap();
        assert_eq!(mirror.load().await.len(), 2);

        let mut renamed = sub("2", "Omar K.");
        renamed.category = "Video".to_string();
        assert!(mirror.replace(&renamed).await.unwrap());
        assert_eq!(mirror.find("2").await.unwrap().person_name, "Omar K.");
        assert!(!mirror.replace(&sub("9", "Nobody")).await.unwrap());

        assert!(mirror.remove("1").await.unwrap());
        assert!(!mirror.remove("1").await.unwrap());
        assert_eq!(mirror.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_primary_falls_back_to_backup() {
        let mirror = LocalMirror::in_memory();

        mirror.save_snapshot(&[sub("1", "Sara")]).await.unwrap();
        mirror.write_raw(MIRROR_KEY, "{not json").await.unwrap();

        let subs = mirror.load().await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "1");
    }

    #[tokio::test]
    async fn test_corrupt_everything_is_empty() {
        let mirror = LocalMirror::in_memory();

        mirror.write_raw(MIRROR_KEY, "oops").await.unwrap();
        mirror.write_raw(MIRROR_BACKUP_KEY, "[1, 2").await.unwrap();

        assert!(mirror.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_migration_reads_legacy_key() {
        let mirror = LocalMirror::in_memory();

        let legacy = serde_json::to_string(&vec![sub("old-1", "Sara"), sub("old-2", "Omar")]).unwrap();
        mirror.write_raw(LEGACY_MIRROR_KEY, &legacy).await.unwrap();

        assert!(mirror.load().await.is_empty());
        assert_eq!(mirror.load_for_migration().await.len(), 2);
    }

    #[tokio::test]
    async fn test_emptied_primary_wins_over_backup() {
        let mirror = LocalMirror::in_memory();

        mirror.save_snapshot(&[sub("1", "Sara")]).await.unwrap();
        assert!(mirror.remove("1").await.unwrap());

        assert!(mirror.load().await.is_empty());
        assert!(mirror.load_for_migration().await.is_empty());
        assert_eq!(mirror.read_raw(MIRROR_BACKUP_KEY).await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_edits_keep_backup_in_step() {
        let mirror = LocalMirror::in_memory();

        mirror.save_snapshot(&[sub("1", "Sara"), sub("2", "Omar")]).await.unwrap();
        let mut renamed = sub("2", "Omar K.");
        renamed.category = "Video".to_string();
        mirror.replace(&renamed).await.unwrap();

        // The backup alone must reflect the edit
        mirror.write_raw(MIRROR_KEY, "garbage").await.unwrap();
        assert_eq!(mirror.find("2").await.unwrap().person_name, "Omar K.");
    }

    #[tokio::test]
    async fn test_bad_record_is_skipped_and_preserved() {
        let mirror = LocalMirror::in_memory();

        let good = serde_json::to_value(sub("1", "Sara")).unwrap();
        let raw = serde_json::json!([good, { "id": "2", "personName": 42 }]).to_string();
        mirror.write_raw(MIRROR_KEY, &raw).await.unwrap();

        let subs = mirror.load().await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "1");

        mirror.append(sub("3", "Lina")).await.unwrap();
        assert_eq!(mirror.load().await.len(), 2);

        let stored = mirror.read_raw(MIRROR_KEY).await.unwrap().unwrap();
        let values: Vec<Value> = serde_json::from_str(&stored).unwrap();
        assert_eq!(values.len(), 3);
        assert!(values.iter().any(|v| v["personName"] == 42));
    }

    #[tokio::test]
    async fn test_timestamped_record_survives_append() {
        let mirror = LocalMirror::in_memory();

        let legacy = serde_json::json!({
            "id": "legacy",
            "personName": "Noor",
            "subscriptionName": "Spotify",
            "startDate": "2025-01-15T00:00:00.000Z",
            "duration": "month",
            "endDate": "2025-02-15T00:00:00.000Z"
        });
        let raw = serde_json::json!([
            serde_json::to_value(sub("A", "Sara")).unwrap(),
            serde_json::to_value(sub("B", "Omar")).unwrap(),
            legacy
        ])
        .to_string();
        mirror.write_raw(MIRROR_KEY, &raw).await.unwrap();
        assert_eq!(mirror.load().await.len(), 3);

        mirror.append(sub("D", "Lina")).await.unwrap();

        let ids: Vec<String> = mirror.load().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["A", "B", "legacy", "D"]);
        let legacy = mirror.find("legacy").await.unwrap();
        assert_eq!(legacy.start_date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_primary_is_set_aside_before_write() {
        let mirror = LocalMirror::in_memory();

        mirror.save_snapshot(&[sub("1", "Sara")]).await.unwrap();
        mirror.write_raw(MIRROR_KEY, "{not json").await.unwrap();

        mirror.append(sub("2", "Omar")).await.unwrap();

        assert_eq!(mirror.load().await.len(), 2);
        let aside = format!("{}_unreadable", MIRROR_KEY);
        assert_eq!(mirror.read_raw(&aside).await.unwrap().as_deref(), Some("{not json"));
    }
}

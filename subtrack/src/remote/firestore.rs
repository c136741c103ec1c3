//! Firestore REST client
//!
//! Talks to `{base_url}/v1/projects/{project}/databases/{database}/documents`
//! with the web API key as the `key` query parameter. The REST API has no
//! push channel, so [`RemoteStore::watch`] polls the ordered query and emits
//! a snapshot only when it differs from the previous one.

use super::codec::{self, Document, RunQueryItem};
use super::{RemoteStore, SnapshotFeed, FEED_CAPACITY};
use crate::config::{RemoteConfig, SUBSCRIPTIONS_COLLECTION};
use crate::database::{FieldChanges, Subscription, SubscriptionFields};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tokio::sync::mpsc;

const USER_AGENT: &str = concat!("subtrack/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    documents_url: String,
    api_key: String,
    collection: String,
    poll_interval: Duration,
}

impl FirestoreClient {
    pub fn new(config: &RemoteConfig, poll_interval: Duration) -> RemoteResult<Self> {
        if !config.is_usable() {
            return Err(RemoteError::NotConfigured);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        let documents_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            config.base_url.trim_end_matches('/'),
            config.project_id,
            config.database
        );

        tracing::info!("Firestore client ready for project {}", config.project_id);

        Ok(Self {
            client,
            documents_url,
            api_key: config.api_key.clone(),
            collection: SUBSCRIPTIONS_COLLECTION.to_string(),
            poll_interval,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.documents_url, self.collection)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), id)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.query(&[("key", &self.api_key)]).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = codec::classify_failure(status.as_u16(), &body);
        tracing::warn!("Firestore request failed with {}: {}", status, err);
        Err(err)
    }

    fn spawn_poller(&self, tx: mpsc::Sender<RemoteResult<Vec<Subscription>>>) {
        let client = self.clone();

        tokio::spawn(async move {
            tracing::debug!("Starting Firestore poll feed every {:?}", client.poll_interval);

            let mut interval = tokio::time::interval(client.poll_interval);
            let mut last: Option<Vec<Subscription>> = None;
            let mut failing = false;

            loop {
                interval.tick().await;

                let message = match client.list_ordered().await {
                    Ok(snapshot) => {
                        failing = false;
                        if last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        last = Some(snapshot.clone());
                        Ok(snapshot)
                    }
                    // One error per outage; the next success re-arms it
                    Err(_) if failing => continue,
                    Err(e) => {
                        failing = true;
                        last = None;
                        Err(e)
                    }
                };

                if tx.send(message).await.is_err() {
                    tracing::debug!("Firestore poll feed closed");
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl RemoteStore for FirestoreClient {
    async fn list_ordered(&self) -> RemoteResult<Vec<Subscription>> {
        let url = format!("{}:runQuery", self.documents_url);
        let request = self
            .client
            .post(url)
            .json(&codec::ordered_query(&self.collection));

        let items: Vec<RunQueryItem> = self.send(request).await?.json().await?;
        let subs = codec::decode_query(items);

        tracing::debug!("Fetched {} subscriptions from Firestore", subs.len());
        Ok(subs)
    }

    async fn insert(&self, fields: &SubscriptionFields) -> RemoteResult<String> {
        let request = self
            .client
            .post(self.collection_url())
            .json(&codec::encode_document(fields));

        let doc: Document = self.send(request).await?.json().await?;
        let id = codec::document_id(&doc.name)?;

        tracing::debug!("Inserted Firestore document: {}", id);
        Ok(id)
    }

    async fn update(&self, id: &str, changes: &FieldChanges) -> RemoteResult<()> {
        let mut params: Vec<(&str, &str)> = changes
            .keys()
            .map(|name| ("updateMask.fieldPaths", *name))
            .collect();
        params.push(("currentDocument.exists", "true"));

        let request = self
            .client
            .patch(self.document_url(id))
            .query(&params)
            .json(&codec::encode_fields(changes));

        self.send(request).await?;

        tracing::debug!("Updated Firestore document {} ({} fields)", id, changes.len());
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.send(self.client.delete(self.document_url(id))).await?;

        tracing::debug!("Deleted Firestore document: {}", id);
        Ok(())
    }

    async fn watch(&self) -> RemoteResult<SnapshotFeed> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        self.spawn_poller(tx);
        Ok(rx)
    }
}

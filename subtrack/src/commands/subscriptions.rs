//! Subscription-related commands
//!
//! CRUD operations, JSON import/export and mirror migration.

use crate::app::AppState;
use crate::database::{NewSubscription, Subscription, SubscriptionPatch};
use crate::error::{AppError, Result};
use crate::services::ImportReport;
use std::path::Path;

/// List all subscriptions ordered by end date
pub async fn list_subscriptions(state: &AppState) -> Result<Vec<Subscription>> {
    Ok(state.sync_service.list().await)
}

/// Create a new subscription
pub async fn add_subscription(state: &AppState, new: NewSubscription) -> Result<Subscription> {
    state.sync_service.add(new).await
}

/// Update a subscription
pub async fn update_subscription(
    state: &AppState,
    id: String,
    patch: SubscriptionPatch,
) -> Result<Subscription> {
    patch.validate()?;

    if patch.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }

    state
        .sync_service
        .update(&id, patch)
        .await
        .ok_or(AppError::SubscriptionNotFound(id))
}

/// Delete a subscription
pub async fn delete_subscription(state: &AppState, id: String) -> Result<()> {
    state.sync_service.delete(&id).await;
    Ok(())
}

/// Import subscriptions from a JSON file
pub async fn import_subscriptions(state: &AppState, path: &Path) -> Result<ImportReport> {
    tracing::info!("Importing subscriptions from {:?}", path);

    let content = tokio::fs::read_to_string(path).await?;
    state.sync_service.import_json(&content).await
}

/// Export subscriptions as JSON, also writing them to `path` when given
pub async fn export_subscriptions(state: &AppState, path: Option<&Path>) -> Result<String> {
    let json = state.sync_service.export_json().await?;

    if let Some(path) = path {
        tokio::fs::write(path, &json).await?;
        tracing::info!("Exported subscriptions to {:?}", path);
    }

    Ok(json)
}

/// Copy mirror-only subscriptions to the remote store
pub async fn migrate_subscriptions(state: &AppState) -> Result<bool> {
    if !state.sync_service.is_remote_configured() {
        return Err(AppError::Config(
            "Remote store is not configured; nothing to migrate to".to_string(),
        ));
    }

    Ok(state.sync_service.migrate().await)
}

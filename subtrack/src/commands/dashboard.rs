//! Dashboard commands

use crate::app::AppState;
use crate::database::{Subscription, SubscriptionDuration};
use crate::error::{AppError, Result};
use crate::services::dashboard::{categories, group_by_duration};
use crate::services::{DashboardSummary, SubscriptionQuery};
use serde::Serialize;

/// Everything the dashboard view shows
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub summary: DashboardSummary,
    pub categories: Vec<String>,
    /// Query matches grouped by duration, in display order
    pub groups: Vec<(SubscriptionDuration, Vec<Subscription>)>,
}

/// Summary over all subscriptions plus the query's matches
pub async fn get_dashboard(state: &AppState, query: SubscriptionQuery) -> Result<DashboardView> {
    let subs = state.sync_service.list().await;
    let today = state.today();
    let threshold = state.config.expiring_threshold_days;

    let matches = query.apply(&subs, today, threshold);

    Ok(DashboardView {
        summary: DashboardSummary::compute(&subs, today, threshold),
        categories: categories(&subs),
        groups: group_by_duration(&matches),
    })
}

/// Clipboard text for one subscription
pub async fn share_subscription(state: &AppState, id: String) -> Result<String> {
    state
        .sync_service
        .list()
        .await
        .into_iter()
        .find(|sub| sub.id == id)
        .map(|sub| sub.share_text(state.today()))
        .ok_or(AppError::SubscriptionNotFound(id))
}

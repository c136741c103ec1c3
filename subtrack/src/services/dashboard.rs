//! Dashboard views
//!
//! Status counts, filtering, grouping and share text, computed over a
//! subscription list and an explicit `today`.

use crate::database::{Subscription, SubscriptionDuration};
use crate::dates::{days_remaining, format_display_date, is_expired, is_expiring_soon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Status of a single subscription on a given day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStatus {
    Active,
    ExpiringSoon,
    Expired,
}

impl SubscriptionStatus {
    /// Expired wins over expiring soon
    pub fn of(sub: &Subscription, today: chrono::NaiveDate, threshold_days: i64) -> Self {
        if is_expired(sub.end_date, today) {
            SubscriptionStatus::Expired
        } else if is_expiring_soon(sub.end_date, today, threshold_days) {
            SubscriptionStatus::ExpiringSoon
        } else {
            SubscriptionStatus::Active
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::ExpiringSoon => "expiring soon",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Human-readable remaining time, e.g. "3 days left" or "ends today"
pub fn remaining_label(days: i64) -> String {
    match days {
        d if d < 0 => format!("expired {} day(s) ago", -d),
        0 => "ends today".to_string(),
        d => format!("{} day(s) left", d),
    }
}

/// Counts shown at the top of the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total: usize,
    /// Not expired; includes the expiring ones
    pub active: usize,
    /// Expiring within the threshold and not expired
    pub expiring_soon: usize,
    pub expired: usize,
}

impl DashboardSummary {
    pub fn compute(
        subscriptions: &[Subscription],
        today: chrono::NaiveDate,
        threshold_days: i64,
    ) -> Self {
        let mut summary = DashboardSummary {
            total: subscriptions.len(),
            ..Default::default()
        };

        for sub in subscriptions {
            match SubscriptionStatus::of(sub, today, threshold_days) {
                SubscriptionStatus::Expired => summary.expired += 1,
                SubscriptionStatus::ExpiringSoon => {
                    summary.active += 1;
                    summary.expiring_soon += 1;
                }
                SubscriptionStatus::Active => summary.active += 1,
            }
        }

        summary
    }
}

/// Status tab of the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Expired,
    Expiring,
}

impl StatusFilter {
    fn matches(self, status: SubscriptionStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status != SubscriptionStatus::Expired,
            StatusFilter::Expired => status == SubscriptionStatus::Expired,
            StatusFilter::Expiring => status == SubscriptionStatus::ExpiringSoon,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "expired" => Ok(StatusFilter::Expired),
            "expiring" => Ok(StatusFilter::Expiring),
            other => Err(format!(
                "Invalid status '{}'. Use 'all', 'active', 'expired' or 'expiring'",
                other
            )),
        }
    }
}

/// Dashboard filter state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionQuery {
    pub status: StatusFilter,
    /// Exact category; `None` means all
    pub category: Option<String>,
    /// Case-insensitive substring over person, service and category
    pub search: Option<String>,
}

impl SubscriptionQuery {
    pub fn matches(&self, sub: &Subscription, today: chrono::NaiveDate, threshold_days: i64) -> bool {
        if !self
            .status
            .matches(SubscriptionStatus::of(sub, today, threshold_days))
        {
            return false;
        }

        if let Some(category) = &self.category {
            if &sub.category != category {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                sub.person_name.to_lowercase().contains(&needle)
                    || sub.subscription_name.to_lowercase().contains(&needle)
                    || sub.category.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    /// Matching subscriptions, original order preserved
    pub fn apply(
        &self,
        subscriptions: &[Subscription],
        today: chrono::NaiveDate,
        threshold_days: i64,
    ) -> Vec<Subscription> {
        subscriptions
            .iter()
            .filter(|sub| self.matches(sub, today, threshold_days))
            .cloned()
            .collect()
    }
}

/// Distinct non-empty categories, sorted
pub fn categories(subscriptions: &[Subscription]) -> Vec<String> {
    subscriptions
        .iter()
        .filter(|sub| !sub.category.is_empty())
        .map(|sub| sub.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One bucket per duration in display order; empty buckets included
pub fn group_by_duration(
    subscriptions: &[Subscription],
) -> Vec<(SubscriptionDuration, Vec<Subscription>)> {
    SubscriptionDuration::ALL
        .iter()
        .map(|&duration| {
            let members = subscriptions
                .iter()
                .filter(|sub| sub.duration == duration)
                .cloned()
                .collect();
            (duration, members)
        })
        .collect()
}

impl Subscription {
    /// Share of the current period still ahead, 0 to 100
    pub fn progress_percent(&self, today: chrono::NaiveDate) -> u8 {
        let remaining = days_remaining(self.end_date, today);
        let total = (self.end_date - self.start_date).num_days();
        if remaining <= 0 || total <= 0 {
            return 0;
        }

        let percent = remaining as f64 / total as f64 * 100.0;
        percent.round().clamp(0.0, 100.0) as u8
    }

    /// Plain-text summary for the clipboard
    pub fn share_text(&self, today: chrono::NaiveDate) -> String {
        let mut lines = vec![
            format!("Person: {}", self.person_name),
            format!("Subscription: {}", self.subscription_name),
        ];
        if !self.category.is_empty() {
            lines.push(format!("Category: {}", self.category));
        }
        lines.push(format!("Duration: {}", self.duration));
        lines.push(format!("Start: {}", format_display_date(self.start_date)));
        lines.push(format!("End: {}", format_display_date(self.end_date)));
        lines.push(format!(
            "Status: {}",
            remaining_label(days_remaining(self.end_date, today))
        ));

        lines.join("\n")
    }
}

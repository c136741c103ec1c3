//! Renewals service
//!
//! Renewal calendar queries plus a background monitor that raises a
//! renewal alert for each subscription about to expire.
//! The monitor checks every minute by default and alerts once per
//! subscription per day.

use super::notifier::{Alert, Notifier};
use super::sync::SyncService;
use crate::config::DEFAULT_RENEWAL_RANGE_DAYS;
use crate::database::Subscription;
use crate::dates::{days_remaining, subscriptions_by_date, subscriptions_expiring_in_range};
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A subscription that ends within the notice threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalNotice {
    pub subscription_id: String,
    pub person_name: String,
    pub subscription_name: String,
    pub end_date: NaiveDate,
    pub days: i64,
    pub message: String,
}

impl RenewalNotice {
    fn new(sub: &Subscription, days: i64) -> Self {
        Self {
            subscription_id: sub.id.clone(),
            person_name: sub.person_name.clone(),
            subscription_name: sub.subscription_name.clone(),
            end_date: sub.end_date,
            days,
            message: format!(
                "{} day(s) left on {} - {}",
                days, sub.person_name, sub.subscription_name
            ),
        }
    }
}

/// Notices for subscriptions ending 1 to `threshold_days` days from today,
/// soonest first. Subscriptions ending today are not included.
pub fn renewal_notices(
    subscriptions: &[Subscription],
    today: NaiveDate,
    threshold_days: i64,
) -> Vec<RenewalNotice> {
    let mut notices: Vec<RenewalNotice> = subscriptions
        .iter()
        .filter_map(|sub| {
            let days = days_remaining(sub.end_date, today);
            (1..=threshold_days)
                .contains(&days)
                .then(|| RenewalNotice::new(sub, days))
        })
        .collect();

    notices.sort_by_key(|n| n.days);
    notices
}

/// Renewal calendar selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalWindow {
    /// Subscriptions ending on exactly this day
    ByDate(NaiveDate),
    /// Subscriptions ending within the inclusive range
    Range(NaiveDate, NaiveDate),
}

impl RenewalWindow {
    /// Today through one week ahead
    pub fn default_range(today: NaiveDate) -> Self {
        RenewalWindow::Range(today, today + ChronoDuration::days(DEFAULT_RENEWAL_RANGE_DAYS))
    }

    pub fn select(&self, subscriptions: &[Subscription]) -> Vec<Subscription> {
        match *self {
            RenewalWindow::ByDate(date) => subscriptions_by_date(subscriptions, date),
            RenewalWindow::Range(start, end) => {
                subscriptions_expiring_in_range(subscriptions, start, end)
            }
        }
    }
}

/// Background renewal checker
#[derive(Clone)]
pub struct RenewalMonitor {
    sync: SyncService,
    notifier: Arc<dyn Notifier>,
    threshold_days: i64,
    interval: Duration,
    alerted: Arc<Mutex<AlertedToday>>,
}

#[derive(Default)]
struct AlertedToday {
    day: Option<NaiveDate>,
    ids: HashSet<String>,
}

impl RenewalMonitor {
    pub fn new(
        sync: SyncService,
        notifier: Arc<dyn Notifier>,
        threshold_days: i64,
        interval: Duration,
    ) -> Self {
        Self {
            sync,
            notifier,
            threshold_days,
            interval,
            alerted: Arc::new(Mutex::new(AlertedToday::default())),
        }
    }

    /// Start the background loop; the first check runs immediately
    pub fn start(self) -> MonitorHandle {
        let task = tokio::spawn(async move {
            tracing::info!(
                "Starting renewal monitor (every {:?}, {} day threshold)",
                self.interval,
                self.threshold_days
            );

            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                let raised = self.check_and_alert().await;
                if !raised.is_empty() {
                    tracing::debug!("Raised {} renewal alerts", raised.len());
                }
            }
        });

        MonitorHandle { task }
    }

    /// Alert for every notice not yet raised today; returns the new ones
    pub async fn check_and_alert(&self) -> Vec<RenewalNotice> {
        let today = self.sync.clock().today();
        let subs = self.sync.list().await;
        let notices = renewal_notices(&subs, today, self.threshold_days);

        let mut alerted = self.alerted.lock().await;
        if alerted.day != Some(today) {
            alerted.day = Some(today);
            alerted.ids.clear();
        }

        let mut raised = Vec::new();
        for notice in notices {
            if !alerted.ids.insert(notice.subscription_id.clone()) {
                continue;
            }

            tracing::info!("Renewal due: {}", notice.message);
            self.notifier.alert(Alert::renewal_due(notice.message.clone()));
            raised.push(notice);
        }

        raised
    }
}

/// Stops the monitor when dropped
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{NewSubscription, SubscriptionDuration};
    use crate::dates::{Clock, FixedClock};
    use crate::services::notifier::{AlertKind, ChannelNotifier, TracingNotifier};
    use crate::storage::LocalMirror;
    use chrono::Utc;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn new_sub(person: &str, start: &str) -> NewSubscription {
        NewSubscription {
            person_name: person.to_string(),
            subscription_name: "Netflix".to_string(),
            category: "Streaming".to_string(),
            start_date: date(start),
            duration: SubscriptionDuration::Month,
        }
    }

    fn sub(id: &str, person: &str, start: &str) -> Subscription {
        Subscription::from_fields(id, new_sub(person, start).into_fields(Utc::now()))
    }

    #[test]
    fn test_notices_window_and_order() {
        let today = date("2025-02-10");
        let subs = vec![
            sub("a", "Far", "2025-02-18"),    // 2025-03-18
            sub("b", "Week", "2025-01-17"),   // 2025-02-17, 7 days
            sub("c", "Today", "2025-01-10"),  // 2025-02-10, 0 days
            sub("d", "Soon", "2025-01-12"),   // 2025-02-12, 2 days
            sub("e", "Past", "2025-01-01"),   // 2025-02-01
        ];

        let notices = renewal_notices(&subs, today, 7);
        let ids: Vec<&str> = notices.iter().map(|n| n.subscription_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b"]);
        assert_eq!(notices[0].message, "2 day(s) left on Soon - Netflix");
    }

    #[test]
    fn test_window_selection() {
        let subs = vec![
            sub("a", "Sara", "2025-01-15"),
            sub("b", "Omar", "2025-01-20"),
            sub("c", "Lina", "2025-02-01"),
        ];

        let by_date = RenewalWindow::ByDate(date("2025-02-15")).select(&subs);
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].id, "a");

        let range = RenewalWindow::default_range(date("2025-02-13")).select(&subs);
        let ids: Vec<String> = range.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_default_range_is_one_week() {
        assert_eq!(
            RenewalWindow::default_range(date("2025-12-28")),
            RenewalWindow::Range(date("2025-12-28"), date("2026-01-04"))
        );
    }

    #[tokio::test]
    async fn test_monitor_alerts_once_per_day() {
        let clock = Arc::new(FixedClock::on(date("2025-02-10")));
        let sync = SyncService::new(
            LocalMirror::in_memory(),
            None,
            Arc::new(TracingNotifier),
            clock.clone(),
        );
        sync.add(new_sub("Sara", "2025-01-15")).await.unwrap();
        sync.add(new_sub("Omar", "2025-03-01")).await.unwrap();

        let (notifier, mut alerts) = ChannelNotifier::new();
        let monitor = RenewalMonitor::new(sync, Arc::new(notifier), 7, Duration::from_secs(60));

        let first = monitor.check_and_alert().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].days, 5);

        let alert = alerts.try_recv().unwrap();
        assert_eq!(alert.kind, AlertKind::RenewalDue);
        assert!(alert.body.contains("Sara"));

        assert!(monitor.check_and_alert().await.is_empty());
        assert!(alerts.try_recv().is_err());

        clock.advance(ChronoDuration::days(1));
        let next_day = monitor.check_and_alert().await;
        assert_eq!(next_day[0].days, 4);
        assert_eq!(clock.today(), date("2025-02-11"));
    }

    #[tokio::test]
    async fn test_started_monitor_runs_and_stops() {
        let clock = Arc::new(FixedClock::on(date("2025-02-10")));
        let sync = SyncService::new(
            LocalMirror::in_memory(),
            None,
            Arc::new(TracingNotifier),
            clock,
        );
        sync.add(new_sub("Sara", "2025-01-15")).await.unwrap();

        let (notifier, mut alerts) = ChannelNotifier::new();
        let handle = RenewalMonitor::new(sync, Arc::new(notifier), 7, Duration::from_millis(50)).start();

        let alert = tokio::time::timeout(std::time::Duration::from_secs(2), alerts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.kind, AlertKind::RenewalDue);
        assert!(handle.is_running());

        handle.stop();
    }
}

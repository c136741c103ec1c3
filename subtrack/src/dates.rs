//! Duration and date arithmetic
//!
//! Pure functions over an injected `today`. Nothing in here reads the system
//! clock; services obtain the current date from a [`Clock`].
//!
//! Month arithmetic clamps to the last valid day of the target month:
//! Jan 31 + 1 month is Feb 28 (or Feb 29 in a leap year), and
//! Feb 29 + 1 year is Feb 28.

use crate::database::{Subscription, SubscriptionDuration};
use chrono::{DateTime, Local, Months, NaiveDate, Utc};
use std::sync::Mutex;

/// End of the period that begins on `start`
pub fn calculate_end_date(start: NaiveDate, duration: SubscriptionDuration) -> NaiveDate {
    start
        .checked_add_months(Months::new(duration.months()))
        .unwrap_or(NaiveDate::MAX)
}

/// Whole calendar days from `today` until `end`; negative once passed
pub fn days_remaining(end: NaiveDate, today: NaiveDate) -> i64 {
    (end - today).num_days()
}

/// True once the end date lies strictly before today
pub fn is_expired(end: NaiveDate, today: NaiveDate) -> bool {
    days_remaining(end, today) < 0
}

/// True when the end date is between today and `threshold_days` ahead, inclusive
pub fn is_expiring_soon(end: NaiveDate, today: NaiveDate, threshold_days: i64) -> bool {
    let days = days_remaining(end, today);
    (0..=threshold_days).contains(&days)
}

/// Subscriptions whose end date falls on `target`
pub fn subscriptions_by_date(subscriptions: &[Subscription], target: NaiveDate) -> Vec<Subscription> {
    subscriptions
        .iter()
        .filter(|sub| sub.end_date == target)
        .cloned()
        .collect()
}

/// Subscriptions whose end date lies within `[start, end]`
pub fn subscriptions_expiring_in_range(
    subscriptions: &[Subscription],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<Subscription> {
    subscriptions
        .iter()
        .filter(|sub| sub.end_date >= start && sub.end_date <= end)
        .cloned()
        .collect()
}

/// Day/month/year without padding, e.g. "5/2/2025"
pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%-d/%-m/%Y").to_string()
}

/// Parse "YYYY-MM-DD", tolerating a trailing time component
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate;
}

/// Wall clock; "today" is the local calendar date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Settable clock for tests; "today" is the UTC date of `now`
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock pinned to midday UTC on `date`
    pub fn on(date: NaiveDate) -> Self {
        Self::new(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SubscriptionFields;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sub_ending(id: &str, end: &str) -> Subscription {
        Subscription::from_fields(
            id,
            SubscriptionFields {
                person_name: "Person".to_string(),
                subscription_name: format!("Service {}", id),
                category: "Streaming".to_string(),
                start_date: date("2024-01-01"),
                duration: SubscriptionDuration::Month,
                end_date: date(end),
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_end_date_per_duration() {
        let start = date("2025-01-15");
        assert_eq!(calculate_end_date(start, SubscriptionDuration::Month), date("2025-02-15"));
        assert_eq!(calculate_end_date(start, SubscriptionDuration::ThreeMonths), date("2025-04-15"));
        assert_eq!(calculate_end_date(start, SubscriptionDuration::SixMonths), date("2025-07-15"));
        assert_eq!(calculate_end_date(start, SubscriptionDuration::Year), date("2026-01-15"));
    }

    #[test]
    fn test_end_date_clamps_month_overflow() {
        assert_eq!(
            calculate_end_date(date("2025-01-31"), SubscriptionDuration::Month),
            date("2025-02-28")
        );
        assert_eq!(
            calculate_end_date(date("2024-01-31"), SubscriptionDuration::Month),
            date("2024-02-29")
        );
        assert_eq!(
            calculate_end_date(date("2024-02-29"), SubscriptionDuration::Year),
            date("2025-02-28")
        );
        assert_eq!(
            calculate_end_date(date("2025-08-31"), SubscriptionDuration::SixMonths),
            date("2026-02-28")
        );
    }

    #[test]
    fn test_days_remaining_grows_with_duration() {
        let start = date("2025-03-10");
        let mut previous = 0;

        for duration in SubscriptionDuration::ALL {
            let end = calculate_end_date(start, duration);
            let days = days_remaining(end, start);
            assert!(days > previous, "{} should outlast the shorter durations", duration);
            previous = days;
        }
    }

    #[test]
    fn test_month_scenario() {
        let end = calculate_end_date(date("2025-01-15"), SubscriptionDuration::Month);
        let today = date("2025-02-10");

        assert_eq!(end, date("2025-02-15"));
        assert_eq!(days_remaining(end, today), 5);
        assert!(is_expiring_soon(end, today, 7));
        assert!(!is_expired(end, today));
    }

    #[test]
    fn test_status_boundaries() {
        let end = date("2025-02-15");

        // End day itself is still current
        assert!(!is_expired(end, end));
        assert!(is_expiring_soon(end, end, 7));

        let after = date("2025-02-16");
        assert_eq!(days_remaining(end, after), -1);
        assert!(is_expired(end, after));
        assert!(!is_expiring_soon(end, after, 7));

        let week_before = date("2025-02-08");
        assert!(is_expiring_soon(end, week_before, 7));
        assert!(!is_expiring_soon(end, date("2025-02-07"), 7));
    }

    #[test]
    fn test_expired_matches_negative_days() {
        let today = date("2025-06-01");
        for offset in -10..=10 {
            let end = today + chrono::Duration::days(offset);
            assert_eq!(is_expired(end, today), days_remaining(end, today) < 0);
            assert_eq!(
                is_expiring_soon(end, today, 7),
                (0..=7).contains(&days_remaining(end, today))
            );
        }
    }

    #[test]
    fn test_filter_by_date_and_range() {
        let subs = vec![
            sub_ending("a", "2025-03-01"),
            sub_ending("b", "2025-03-05"),
            sub_ending("c", "2025-03-08"),
            sub_ending("d", "2025-04-01"),
        ];

        let on_day = subscriptions_by_date(&subs, date("2025-03-05"));
        assert_eq!(on_day.len(), 1);
        assert_eq!(on_day[0].id, "b");

        let in_range = subscriptions_expiring_in_range(&subs, date("2025-03-01"), date("2025-03-08"));
        let ids: Vec<&str> = in_range.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert!(subscriptions_expiring_in_range(&subs, date("2025-03-09"), date("2025-03-31")).is_empty());
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(format_display_date(date("2025-02-05")), "5/2/2025");
        assert_eq!(parse_date("2025-02-05"), Some(date("2025-02-05")));
        assert_eq!(parse_date("2025-02-05T10:30:00.000Z"), Some(date("2025-02-05")));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::on(date("2025-02-10"));
        assert_eq!(clock.today(), date("2025-02-10"));

        clock.advance(chrono::Duration::days(3));
        assert_eq!(clock.today(), date("2025-02-13"));
    }
}

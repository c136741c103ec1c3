//! Renewal-related commands
//!
//! Renewal calendar lookups and the expiry notices list.

use crate::app::AppState;
use crate::database::Subscription;
use crate::dates::parse_date;
use crate::error::{AppError, Result};
use crate::services::{renewal_notices, RenewalNotice, RenewalWindow};
use chrono::NaiveDate;

/// Subscriptions ending on `date`, or within `start..=end`.
///
/// With no arguments the window is today through one week ahead.
pub async fn list_renewals(
    state: &AppState,
    date: Option<String>,
    range: Option<(String, String)>,
) -> Result<Vec<Subscription>> {
    let window = match (date, range) {
        (Some(date), None) => RenewalWindow::ByDate(parse_arg(&date)?),
        (None, Some((start, end))) => {
            let (start, end) = (parse_arg(&start)?, parse_arg(&end)?);
            if end < start {
                return Err(AppError::Validation(format!(
                    "Range end {} is before its start {}",
                    end, start
                )));
            }
            RenewalWindow::Range(start, end)
        }
        (None, None) => RenewalWindow::default_range(state.today()),
        (Some(_), Some(_)) => {
            return Err(AppError::Validation(
                "Pass either a date or a range, not both".to_string(),
            ))
        }
    };

    let subs = state.sync_service.list().await;
    Ok(window.select(&subs))
}

/// Subscriptions ending within the configured threshold, soonest first
pub async fn list_renewal_notices(state: &AppState) -> Result<Vec<RenewalNotice>> {
    let subs = state.sync_service.list().await;
    Ok(renewal_notices(
        &subs,
        state.today(),
        state.config.expiring_threshold_days,
    ))
}

fn parse_arg(raw: &str) -> Result<NaiveDate> {
    parse_date(raw).ok_or_else(|| AppError::Validation(format!("Invalid date: {}", raw)))
}

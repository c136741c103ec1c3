//! Subscription models
//!
//! Rust structs for subscription records. JSON uses camelCase field names so
//! mirror contents and remote documents share one shape.

use crate::dates::{calculate_end_date, parse_date};
use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const FIELD_PERSON_NAME: &str = "personName";
pub const FIELD_SUBSCRIPTION_NAME: &str = "subscriptionName";
pub const FIELD_CATEGORY: &str = "category";
pub const FIELD_START_DATE: &str = "startDate";
pub const FIELD_DURATION: &str = "duration";
pub const FIELD_END_DATE: &str = "endDate";
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Field name to string value, as sent to the remote store on update
pub type FieldChanges = BTreeMap<&'static str, String>;

/// Billing period of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubscriptionDuration {
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "3months")]
    ThreeMonths,
    #[serde(rename = "6months")]
    SixMonths,
    #[serde(rename = "year")]
    Year,
}

impl SubscriptionDuration {
    /// All durations in display order
    pub const ALL: [SubscriptionDuration; 4] = [
        SubscriptionDuration::Month,
        SubscriptionDuration::ThreeMonths,
        SubscriptionDuration::SixMonths,
        SubscriptionDuration::Year,
    ];

    /// Calendar months covered by one period
    pub fn months(self) -> u32 {
        match self {
            SubscriptionDuration::Month => 1,
            SubscriptionDuration::ThreeMonths => 3,
            SubscriptionDuration::SixMonths => 6,
            SubscriptionDuration::Year => 12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionDuration::Month => "month",
            SubscriptionDuration::ThreeMonths => "3months",
            SubscriptionDuration::SixMonths => "6months",
            SubscriptionDuration::Year => "year",
        }
    }
}

impl fmt::Display for SubscriptionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" | "1month" => Ok(SubscriptionDuration::Month),
            "3months" => Ok(SubscriptionDuration::ThreeMonths),
            "6months" => Ok(SubscriptionDuration::SixMonths),
            "year" | "12months" => Ok(SubscriptionDuration::Year),
            other => Err(format!(
                "Invalid duration '{}'. Use 'month', '3months', '6months' or 'year'",
                other
            )),
        }
    }
}

fn legacy_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Accepts plain dates as well as legacy timestamps such as
/// `2025-01-15T00:00:00.000Z`
fn lenient_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
}

/// A persisted subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub person_name: String,
    pub subscription_name: String,
    /// Older records were saved without a category
    #[serde(default)]
    pub category: String,
    #[serde(deserialize_with = "lenient_date")]
    pub start_date: NaiveDate,
    pub duration: SubscriptionDuration,
    /// Derived from start_date + duration whenever the record is written
    #[serde(deserialize_with = "lenient_date")]
    pub end_date: NaiveDate,
    #[serde(default = "legacy_created_at")]
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn from_fields(id: impl Into<String>, fields: SubscriptionFields) -> Self {
        Self {
            id: id.into(),
            person_name: fields.person_name,
            subscription_name: fields.subscription_name,
            category: fields.category,
            start_date: fields.start_date,
            duration: fields.duration,
            end_date: fields.end_date,
            created_at: fields.created_at,
        }
    }

    pub fn fields(&self) -> SubscriptionFields {
        SubscriptionFields {
            person_name: self.person_name.clone(),
            subscription_name: self.subscription_name.clone(),
            category: self.category.clone(),
            start_date: self.start_date,
            duration: self.duration,
            end_date: self.end_date,
            created_at: self.created_at,
        }
    }

    /// Identity by content rather than id; local and remote ids differ
    pub fn content_key(&self) -> String {
        content_key(
            &self.person_name,
            &self.subscription_name,
            self.start_date,
            self.end_date,
        )
    }
}

/// Document body stored remotely: a subscription without its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFields {
    pub person_name: String,
    pub subscription_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(deserialize_with = "lenient_date")]
    pub start_date: NaiveDate,
    pub duration: SubscriptionDuration,
    #[serde(deserialize_with = "lenient_date")]
    pub end_date: NaiveDate,
    #[serde(default = "legacy_created_at")]
    pub created_at: DateTime<Utc>,
}

impl SubscriptionFields {
    pub fn content_key(&self) -> String {
        content_key(
            &self.person_name,
            &self.subscription_name,
            self.start_date,
            self.end_date,
        )
    }

    /// Flatten into field name / string pairs
    pub fn to_field_map(&self) -> FieldChanges {
        let mut map = FieldChanges::new();
        map.insert(FIELD_PERSON_NAME, self.person_name.clone());
        map.insert(FIELD_SUBSCRIPTION_NAME, self.subscription_name.clone());
        map.insert(FIELD_CATEGORY, self.category.clone());
        map.insert(FIELD_START_DATE, self.start_date.to_string());
        map.insert(FIELD_DURATION, self.duration.as_str().to_string());
        map.insert(FIELD_END_DATE, self.end_date.to_string());
        map.insert(FIELD_CREATED_AT, self.created_at.to_rfc3339());
        map
    }

    /// Rebuild from field name / string pairs, as read from a document
    pub fn from_field_map(map: &BTreeMap<String, String>) -> std::result::Result<Self, String> {
        let text = |name: &str| -> std::result::Result<String, String> {
            map.get(name)
                .cloned()
                .ok_or_else(|| format!("missing field '{}'", name))
        };
        let date = |name: &str| -> std::result::Result<NaiveDate, String> {
            let raw = text(name)?;
            parse_date(&raw).ok_or_else(|| format!("invalid date in '{}': {}", name, raw))
        };

        let created_at = match map.get(FIELD_CREATED_AT) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| format!("invalid createdAt '{}': {}", raw, e))?
                .with_timezone(&Utc),
            None => legacy_created_at(),
        };

        Ok(Self {
            person_name: text(FIELD_PERSON_NAME)?,
            subscription_name: text(FIELD_SUBSCRIPTION_NAME)?,
            category: map.get(FIELD_CATEGORY).cloned().unwrap_or_default(),
            start_date: date(FIELD_START_DATE)?,
            duration: text(FIELD_DURATION)?.parse()?,
            end_date: date(FIELD_END_DATE)?,
            created_at,
        })
    }

    /// Apply a set of field changes in place
    pub fn apply_changes(&mut self, changes: &FieldChanges) -> std::result::Result<(), String> {
        let mut map: BTreeMap<String, String> = self
            .to_field_map()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        for (name, value) in changes {
            map.insert(name.to_string(), value.clone());
        }

        *self = Self::from_field_map(&map)?;
        Ok(())
    }
}

fn content_key(
    person_name: &str,
    subscription_name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> String {
    format!(
        "{}_{}_{}_{}",
        person_name, subscription_name, start_date, end_date
    )
}

/// Add-form payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub person_name: String,
    pub subscription_name: String,
    pub category: String,
    #[serde(deserialize_with = "lenient_date")]
    pub start_date: NaiveDate,
    pub duration: SubscriptionDuration,
}

impl NewSubscription {
    /// Reject blank required text fields
    pub fn validate(&self) -> Result<()> {
        let required = [
            (FIELD_PERSON_NAME, &self.person_name),
            (FIELD_SUBSCRIPTION_NAME, &self.subscription_name),
            (FIELD_CATEGORY, &self.category),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{} is required", name)));
            }
        }

        Ok(())
    }

    /// Stamp the creation time and derive the end date
    pub fn into_fields(self, created_at: DateTime<Utc>) -> SubscriptionFields {
        let end_date = calculate_end_date(self.start_date, self.duration);
        SubscriptionFields {
            person_name: self.person_name.trim().to_string(),
            subscription_name: self.subscription_name.trim().to_string(),
            category: self.category.trim().to_string(),
            start_date: self.start_date,
            duration: self.duration,
            end_date,
            created_at,
        }
    }
}

/// Partial update; the end date is never supplied directly
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPatch {
    pub person_name: Option<String>,
    pub subscription_name: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub duration: Option<SubscriptionDuration>,
}

impl SubscriptionPatch {
    pub fn is_empty(&self) -> bool {
        self.person_name.is_none()
            && self.subscription_name.is_none()
            && self.category.is_none()
            && self.start_date.is_none()
            && self.duration.is_none()
    }

    /// Whether applying the patch moves the end date
    pub fn changes_schedule(&self) -> bool {
        self.start_date.is_some() || self.duration.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        let optional = [
            (FIELD_PERSON_NAME, &self.person_name),
            (FIELD_SUBSCRIPTION_NAME, &self.subscription_name),
            (FIELD_CATEGORY, &self.category),
        ];

        for (name, value) in optional {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(AppError::Validation(format!("{} must not be blank", name)));
            }
        }

        Ok(())
    }

    /// Merge into a copy of `current`, recomputing the end date
    pub fn apply_to(&self, current: &Subscription) -> Subscription {
        let mut updated = current.clone();

        if let Some(v) = &self.person_name {
            updated.person_name = v.trim().to_string();
        }
        if let Some(v) = &self.subscription_name {
            updated.subscription_name = v.trim().to_string();
        }
        if let Some(v) = &self.category {
            updated.category = v.trim().to_string();
        }
        if let Some(v) = self.start_date {
            updated.start_date = v;
        }
        if let Some(v) = self.duration {
            updated.duration = v;
        }

        updated.end_date = calculate_end_date(updated.start_date, updated.duration);
        updated
    }

    /// Text fields of the patch, trimmed as they will be stored
    pub fn text_changes(&self) -> FieldChanges {
        let text = [
            (FIELD_PERSON_NAME, &self.person_name),
            (FIELD_SUBSCRIPTION_NAME, &self.subscription_name),
            (FIELD_CATEGORY, &self.category),
        ];

        text.into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.trim().to_string())))
            .collect()
    }

    /// Fields to send to the remote store; includes the derived end date
    pub fn field_changes(&self, merged: &Subscription) -> FieldChanges {
        let mut changes = self.text_changes();

        if self.start_date.is_some() {
            changes.insert(FIELD_START_DATE, merged.start_date.to_string());
        }
        if self.duration.is_some() {
            changes.insert(FIELD_DURATION, merged.duration.as_str().to_string());
        }
        if self.changes_schedule() {
            changes.insert(FIELD_END_DATE, merged.end_date.to_string());
        }

        changes
    }
}

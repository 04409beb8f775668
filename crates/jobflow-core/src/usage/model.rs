use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Metered usage buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsageType {
    DeepResearch,
    PreLander,
}

/// Weekly usage counter of one organization for one bucket.
///
/// `current_usage <= limit` holds under normal admission; confirmed overage
/// may push it past `limit` and billing reconciles out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub organization_id: String,
    pub usage_type: UsageType,
    pub current_usage: u32,
    pub limit: u32,
    pub week_start: NaiveDate,
}

impl UsageRecord {
    pub fn new(
        organization_id: impl Into<String>,
        usage_type: UsageType,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            usage_type,
            current_usage: 0,
            limit,
            week_start: week_start(now),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current_usage)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_usage >= self.limit
    }

    /// Units consumed beyond the limit.
    pub fn overage(&self) -> u32 {
        self.current_usage.saturating_sub(self.limit)
    }
}

/// Price of admitting a request past the weekly limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverageQuote {
    pub overage_units: u32,
    pub overage_cost: f64,
    pub currency: String,
}

/// Answer of a usage check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UsageCheck {
    /// Admitted; the counter was incremented.
    Allowed { current_usage: u32, limit: u32 },
    /// Rejected; the counter is unchanged.
    NotAllowed { current_usage: u32, limit: u32 },
    /// Rejected until the caller confirms billable overage.
    ConfirmationRequired(OverageQuote),
}

impl UsageCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> NaiveDate {
    let date = now.date_naive();
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

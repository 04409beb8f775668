use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobflow_core::usage::{
    OverageQuote, UsageCheck, UsageRecord, UsageService, UsageType, week_start,
};
use jobflow_core::user::UserContext;
use jobflow_core::{JobflowError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

const DEFAULT_WEEKLY_LIMIT: u32 = 10;

/// Price per unit past the weekly limit.
#[derive(Debug, Clone, PartialEq)]
pub struct OveragePricing {
    pub unit_cost: f64,
    pub currency: String,
}

/// In-process weekly usage counters.
///
/// Without overage pricing a request past the limit is simply not allowed;
/// with pricing it asks for confirmation first. Either way the override flag
/// admits it and counts the overage.
pub struct InMemoryUsageLedger {
    limits: HashMap<UsageType, u32>,
    pricing: Option<OveragePricing>,
    records: Mutex<HashMap<(String, UsageType), UsageRecord>>,
}

impl Default for InMemoryUsageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self {
            limits: HashMap::new(),
            pricing: None,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limit(mut self, usage_type: UsageType, limit: u32) -> Self {
        self.limits.insert(usage_type, limit);
        self
    }

    pub fn with_overage_pricing(mut self, pricing: OveragePricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    fn limit_for(&self, usage_type: UsageType) -> u32 {
        self.limits
            .get(&usage_type)
            .copied()
            .unwrap_or(DEFAULT_WEEKLY_LIMIT)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, UsageType), UsageRecord>>> {
        self.records
            .lock()
            .map_err(|e| JobflowError::internal(format!("usage ledger lock poisoned: {e}")))
    }

    fn current_record<'a>(
        &self,
        records: &'a mut HashMap<(String, UsageType), UsageRecord>,
        organization_id: &str,
        usage_type: UsageType,
        now: DateTime<Utc>,
    ) -> &'a mut UsageRecord {
        let limit = self.limit_for(usage_type);
        let record = records
            .entry((organization_id.to_string(), usage_type))
            .or_insert_with(|| UsageRecord::new(organization_id, usage_type, limit, now));

        let this_week = week_start(now);
        if record.week_start != this_week {
            tracing::debug!(
                "[UsageLedger] New week for org {} ({}), resetting {}",
                organization_id,
                this_week,
                usage_type
            );
            record.week_start = this_week;
            record.current_usage = 0;
        }
        record.limit = limit;
        record
    }

    /// Sets the current week's counter directly.
    pub fn seed(&self, user: &UserContext, usage_type: UsageType, current_usage: u32) -> Result<()> {
        let mut records = self.lock()?;
        let record =
            self.current_record(&mut records, &user.organization_id, usage_type, Utc::now());
        record.current_usage = current_usage;
        Ok(())
    }

    /// `check_and_increment` against an explicit clock.
    pub fn check_and_increment_at(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        confirm_overage: bool,
        now: DateTime<Utc>,
    ) -> Result<UsageCheck> {
        let mut records = self.lock()?;
        let record = self.current_record(&mut records, &user.organization_id, usage_type, now);

        if record.current_usage < record.limit || confirm_overage {
            record.current_usage += 1;
            return Ok(UsageCheck::Allowed {
                current_usage: record.current_usage,
                limit: record.limit,
            });
        }

        Ok(match &self.pricing {
            Some(pricing) => {
                let overage_units = record.overage() + 1;
                UsageCheck::ConfirmationRequired(OverageQuote {
                    overage_units,
                    overage_cost: pricing.unit_cost * f64::from(overage_units),
                    currency: pricing.currency.clone(),
                })
            }
            None => UsageCheck::NotAllowed {
                current_usage: record.current_usage,
                limit: record.limit,
            },
        })
    }

    /// `usage` against an explicit clock.
    pub fn usage_at(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        let mut records = self.lock()?;
        Ok(self
            .current_record(&mut records, &user.organization_id, usage_type, now)
            .clone())
    }
}

#[async_trait]
impl UsageService for InMemoryUsageLedger {
    async fn check_and_increment(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        confirm_overage: bool,
        _token: &str,
    ) -> Result<UsageCheck> {
        self.check_and_increment_at(user, usage_type, confirm_overage, Utc::now())
    }

    async fn usage(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        _token: &str,
    ) -> Result<UsageRecord> {
        self.usage_at(user, usage_type, Utc::now())
    }
}

//! Usage service trait.

use async_trait::async_trait;

use super::model::{UsageCheck, UsageRecord, UsageType};
use crate::error::Result;
use crate::user::UserContext;

/// Per-organization weekly quota bookkeeping.
///
/// Remote implementations authenticate with `token`; local ones ignore it.
#[async_trait]
pub trait UsageService: Send + Sync {
    /// Checks the quota and, when admitted, increments it.
    ///
    /// With `confirm_overage` set, a request past the limit is admitted and
    /// counted as overage.
    async fn check_and_increment(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        confirm_overage: bool,
        token: &str,
    ) -> Result<UsageCheck>;

    /// Reads the current counter without incrementing it.
    async fn usage(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        token: &str,
    ) -> Result<UsageRecord>;
}

//! Admission control against the weekly usage quota.

use async_trait::async_trait;
use jobflow_core::error::AdmissionReason;
use jobflow_core::usage::{OverageQuote, UsageCheck, UsageRecord, UsageService, UsageType};
use jobflow_core::user::UserContext;
use jobflow_core::{JobflowError, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::credential_cache::CredentialCache;

/// A granted admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub usage_type: UsageType,
    pub current_usage: u32,
    pub limit: u32,
    /// Admitted past the limit; the caller must tell the user overage billing applies.
    pub overage: bool,
}

impl Admission {
    fn from_counts(usage_type: UsageType, current_usage: u32, limit: u32) -> Self {
        Self {
            usage_type,
            current_usage,
            limit,
            overage: current_usage > limit,
        }
    }
}

/// Decides whether a billable overage may proceed.
#[async_trait]
pub trait OverageConfirmer: Send + Sync {
    async fn confirm(&self, quote: &OverageQuote) -> bool;
}

/// Confirms every overage without asking anyone.
pub struct AutoConfirmOverage;

#[async_trait]
impl OverageConfirmer for AutoConfirmOverage {
    async fn confirm(&self, quote: &OverageQuote) -> bool {
        tracing::info!(
            "[Admission] Auto-confirming overage of {} unit(s) ({} {})",
            quote.overage_units,
            quote.overage_cost,
            quote.currency
        );
        true
    }
}

/// Declines every overage.
pub struct DeclineOverage;

#[async_trait]
impl OverageConfirmer for DeclineOverage {
    async fn confirm(&self, _quote: &OverageQuote) -> bool {
        false
    }
}

/// Checks and increments the organization's weekly counter before submission.
pub struct AdmissionController {
    usage: Arc<dyn UsageService>,
    credentials: Arc<CredentialCache>,
}

impl AdmissionController {
    pub fn new(usage: Arc<dyn UsageService>, credentials: Arc<CredentialCache>) -> Self {
        Self { usage, credentials }
    }

    async fn check(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        confirm_overage: bool,
    ) -> Result<UsageCheck> {
        let usage = &self.usage;
        self.credentials
            .authorized(|token| async move {
                usage
                    .check_and_increment(user, usage_type, confirm_overage, &token)
                    .await
            })
            .await
    }

    /// First-phase check, without override.
    ///
    /// # Returns
    ///
    /// - `Ok(Admission)`: under the limit, counter incremented
    /// - `Err(UsageLimitExceeded)`: over the limit; show the limit and stop
    /// - `Err(OverageConfirmationRequired)`: over the limit, overage purchasable
    pub async fn check_and_admit(
        &self,
        user: &UserContext,
        usage_type: UsageType,
    ) -> Result<Admission> {
        match self.check(user, usage_type, false).await? {
            UsageCheck::Allowed {
                current_usage,
                limit,
            } => {
                tracing::debug!(
                    "[Admission] {} admitted for org {}: {}/{}",
                    usage_type,
                    user.organization_id,
                    current_usage,
                    limit
                );
                Ok(Admission::from_counts(usage_type, current_usage, limit))
            }
            UsageCheck::NotAllowed {
                current_usage,
                limit,
            } => {
                tracing::info!(
                    "[Admission] {} limit reached for org {}: {}/{}",
                    usage_type,
                    user.organization_id,
                    current_usage,
                    limit
                );
                Err(JobflowError::UsageLimitExceeded {
                    current_usage,
                    limit,
                })
            }
            UsageCheck::ConfirmationRequired(quote) => {
                Err(JobflowError::OverageConfirmationRequired(quote))
            }
        }
    }

    /// Second phase: admits past the limit with the override flag set.
    pub async fn admit_with_override(
        &self,
        user: &UserContext,
        usage_type: UsageType,
    ) -> Result<Admission> {
        match self.check(user, usage_type, true).await? {
            UsageCheck::Allowed {
                current_usage,
                limit,
            } => {
                let admission = Admission::from_counts(usage_type, current_usage, limit);
                if admission.overage {
                    tracing::info!(
                        "[Admission] {} admitted with overage for org {}: {}/{}",
                        usage_type,
                        user.organization_id,
                        current_usage,
                        limit
                    );
                }
                Ok(admission)
            }
            UsageCheck::NotAllowed {
                current_usage,
                limit,
            } => Err(JobflowError::UsageLimitExceeded {
                current_usage,
                limit,
            }),
            UsageCheck::ConfirmationRequired(_) => Err(JobflowError::admission(
                AdmissionReason::OverageUnresolved,
                "usage service still requires overage confirmation",
            )),
        }
    }

    /// Full two-phase admission.
    ///
    /// Asks `confirmer` at most once and re-issues the check at most once.
    pub async fn admit(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        confirmer: &dyn OverageConfirmer,
    ) -> Result<Admission> {
        match self.check_and_admit(user, usage_type).await {
            Err(JobflowError::OverageConfirmationRequired(quote)) => {
                if !confirmer.confirm(&quote).await {
                    return Err(JobflowError::admission(
                        AdmissionReason::OverageDeclined,
                        format!("overage of {} unit(s) declined", quote.overage_units),
                    ));
                }
                self.admit_with_override(user, usage_type).await
            }
            other => other,
        }
    }

    /// Dry-run read of the counter.
    pub async fn usage(&self, user: &UserContext, usage_type: UsageType) -> Result<UsageRecord> {
        let usage = &self.usage;
        self.credentials
            .authorized(|token| async move { usage.usage(user, usage_type, &token).await })
            .await
    }
}

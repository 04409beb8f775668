//! Collaborator traits for the remote job backend.
//!
//! The backend is a stateless executor reachable only through these calls.
//! Wire formats belong to the implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{Artifact, Job, JobFilter, JobPatch, JobPayload};
use crate::error::Result;

/// A freshly issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds from issuance.
    pub expires_in: u64,
}

/// Issues short-lived bearer tokens for the job backend.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire_token(&self) -> Result<TokenGrant>;
}

/// Submit / status / result operations of the job backend.
///
/// Implementations must report authorization failures as
/// `JobflowError::Auth` so the credential cache can refresh and retry.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Submits work and returns the backend-assigned job id.
    ///
    /// `confirm_overage` is set only on the second phase of the overage
    /// escalation.
    async fn submit_job(
        &self,
        payload: &JobPayload,
        token: &str,
        confirm_overage: bool,
    ) -> Result<String>;

    /// Returns the raw backend status string.
    async fn get_job_status(&self, job_id: &str, token: &str) -> Result<String>;

    async fn get_job_result(&self, job_id: &str, token: &str) -> Result<Artifact>;
}

/// Authoritative job list and its mutations.
///
/// Takes the same bearer token as [`JobBackend`].
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn update_job(&self, job_id: &str, patch: &JobPatch, token: &str) -> Result<Job>;

    async fn delete_job(&self, job_id: &str, token: &str) -> Result<()>;

    async fn list_jobs(&self, filter: &JobFilter, token: &str) -> Result<Vec<Job>>;
}

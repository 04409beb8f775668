use jobflow_core::job::{Artifact, JobBackend};
use jobflow_core::{JobflowError, Result};
use std::sync::Arc;

use crate::credential_cache::CredentialCache;

/// Fetches the artifact of a finished job.
pub struct ResultMaterializer {
    backend: Arc<dyn JobBackend>,
    credentials: Arc<CredentialCache>,
}

impl ResultMaterializer {
    pub fn new(backend: Arc<dyn JobBackend>, credentials: Arc<CredentialCache>) -> Self {
        Self {
            backend,
            credentials,
        }
    }

    /// Issues exactly one result request for `job_id`.
    ///
    /// Any failure, including a rejected token after one refresh, surfaces as
    /// `ResultUnavailable`. The job stays succeeded; callers may call again.
    pub async fn fetch_result(&self, job_id: &str) -> Result<Artifact> {
        let backend = &self.backend;
        let result = self
            .credentials
            .authorized(|token| async move { backend.get_job_result(job_id, &token).await })
            .await;

        match result {
            Ok(artifact) => {
                tracing::info!(job_id = %job_id, "[ResultMaterializer] Result fetched");
                Ok(artifact)
            }
            Err(err @ JobflowError::ResultUnavailable { .. }) => {
                tracing::warn!(job_id = %job_id, "[ResultMaterializer] {err}");
                Err(err)
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    "[ResultMaterializer] Failed to fetch result: {err}"
                );
                Err(JobflowError::result_unavailable(job_id, err.to_string()))
            }
        }
    }
}

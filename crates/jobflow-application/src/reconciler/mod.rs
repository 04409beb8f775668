//! Optimistic edits and deletes over the job list.

mod overlay;

pub use overlay::{OverlayEntry, OverlayState};

use jobflow_core::Result;
use jobflow_core::job::{Job, JobFilter, JobPatch, JobStore};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::credential_cache::CredentialCache;

/// Keeps the displayed job list responsive while mutations are in flight.
///
/// Edits and deletes show up in [`render`](Self::render) before the store
/// confirms them; failures roll the overlay back and return the error.
pub struct ListReconciler {
    store: Arc<dyn JobStore>,
    credentials: Arc<CredentialCache>,
    state: RwLock<OverlayState>,
}

impl ListReconciler {
    pub fn new(store: Arc<dyn JobStore>, credentials: Arc<CredentialCache>) -> Self {
        Self {
            store,
            credentials,
            state: RwLock::new(OverlayState::new()),
        }
    }

    /// Refetches the authoritative list and returns the rendered view.
    ///
    /// A filtered refetch only settles pending changes for rows the filter
    /// would have returned.
    pub async fn refresh(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let store = &self.store;
        let jobs = self
            .credentials
            .authorized(|token| async move { store.list_jobs(filter, &token).await })
            .await?;
        tracing::debug!("[ListReconciler] Refetched {} job(s)", jobs.len());

        let mut state = self.state.write().await;
        state.replace_filtered(jobs, filter);
        Ok(state.render())
    }

    pub async fn render(&self) -> Vec<Job> {
        self.state.read().await.render()
    }

    pub async fn entry(&self, job_id: &str) -> Option<OverlayEntry> {
        self.state.read().await.entry(job_id)
    }

    /// Applies `patch` locally, then sends it to the store.
    pub async fn edit(&self, job_id: &str, patch: JobPatch) -> Result<Job> {
        let version = self.state.write().await.apply_patch(job_id, patch.clone());

        let store = &self.store;
        let sent = &patch;
        let result = self
            .credentials
            .authorized(|token| async move { store.update_job(job_id, sent, &token).await })
            .await;

        match result {
            Ok(job) => {
                let mut state = self.state.write().await;
                state.clear_patch_if(job_id, version);
                state.upsert_authoritative(job.clone());
                Ok(job)
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    "[ListReconciler] Edit failed, reverting: {err}"
                );
                self.state.write().await.clear_patch_if(job_id, version);
                Err(err)
            }
        }
    }

    /// Hides the job locally, then deletes it in the store.
    ///
    /// On success the row stays hidden until a refetch no longer returns it.
    pub async fn delete(&self, job_id: &str) -> Result<()> {
        self.state.write().await.add_tombstone(job_id);

        let store = &self.store;
        let result = self
            .credentials
            .authorized(|token| async move { store.delete_job(job_id, &token).await })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "[ListReconciler] Deleted");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    "[ListReconciler] Delete failed, restoring: {err}"
                );
                self.state.write().await.remove_tombstone(job_id);
                Err(err)
            }
        }
    }
}

//! Cancellable status polling for one job.

use jobflow_application::{CredentialCache, ResultMaterializer};
use jobflow_core::config::PollingProfile;
use jobflow_core::job::{Artifact, JobBackend, JobPhase};
use jobflow_core::progress::ProgressTracker;
use jobflow_core::{JobflowError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One progress notification, emitted after every successful status check.
#[derive(Debug, Clone, Serialize)]
pub struct PollProgress {
    pub job_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub phase: JobPhase,
    /// Status string exactly as the backend sent it.
    pub raw_status: String,
    pub percent: f64,
    pub stage_index: usize,
    pub stage_label: Option<String>,
    pub elapsed: Duration,
}

/// How a polling session ended, other than with an error.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The job finished and its artifact was fetched.
    Completed(Artifact),
    /// The attempt budget ran out while the job was still running.
    ///
    /// The job may still finish on the backend; this is a "still processing"
    /// notice, not a failure.
    TimedOut { attempts: u32, elapsed: Duration },
    /// The caller cancelled. The backend job is left untouched.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Completed(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Polls job status until a terminal phase, the attempt budget, or cancellation.
pub struct StatusPoller {
    backend: Arc<dyn JobBackend>,
    credentials: Arc<CredentialCache>,
    materializer: Arc<ResultMaterializer>,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        credentials: Arc<CredentialCache>,
        materializer: Arc<ResultMaterializer>,
    ) -> Self {
        Self {
            backend,
            credentials,
            materializer,
        }
    }

    /// Runs one polling session for `job_id`.
    ///
    /// Every attempt waits `profile.interval()` and then issues a single
    /// status request; requests never overlap. Transient errors are logged
    /// and the next attempt proceeds, except on the final attempt where the
    /// error is returned. Authorization errors that survive the credential
    /// refresh end the session, as does a job id the backend does not know.
    ///
    /// # Returns
    ///
    /// - `Ok(Completed)`: `Done` observed, progress 100 reported, result fetched once
    /// - `Ok(TimedOut)`: budget exhausted while non-terminal
    /// - `Ok(Cancelled)`: `cancel` fired; no request is issued afterwards
    /// - `Err(JobFailed)`: the backend reported failure
    /// - `Err(ResultUnavailable)`: `Done` observed but the artifact fetch failed
    pub async fn poll_until_terminal<F>(
        &self,
        job_id: &str,
        profile: &PollingProfile,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome>
    where
        F: FnMut(&PollProgress) + Send,
    {
        let started = Instant::now();
        let max_attempts = profile.max_attempts;
        let mut tracker = ProgressTracker::new(profile.schedule.clone());
        let mut completed = 0;

        tracing::info!(
            job_id = %job_id,
            "[StatusPoller] Polling every {:?}, up to {} attempt(s)",
            profile.interval(),
            max_attempts
        );

        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(job_id, completed)),
                _ = tokio::time::sleep(profile.interval()) => {}
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(job_id, completed)),
                status = self.fetch_status(job_id) => status,
            };
            completed = attempt;

            let raw_status = match status {
                Ok(raw) => raw,
                Err(err) if err.is_auth() || err.is_not_found() => {
                    tracing::error!(job_id = %job_id, "[StatusPoller] {err}");
                    return Err(err);
                }
                Err(err) if attempt == max_attempts => {
                    tracing::warn!(
                        job_id = %job_id,
                        "[StatusPoller] Final attempt {} failed: {err}",
                        attempt
                    );
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        job_id = %job_id,
                        "[StatusPoller] Status check {}/{} failed, continuing: {err}",
                        attempt,
                        max_attempts
                    );
                    continue;
                }
            };

            let phase = JobPhase::from_status(&raw_status);
            let elapsed = started.elapsed();
            let snapshot = tracker.observe(phase, elapsed);

            tracing::debug!(
                job_id = %job_id,
                "[StatusPoller] Attempt {}: '{}' -> {} ({:.0}%)",
                attempt,
                raw_status,
                phase,
                snapshot.percent
            );

            on_progress(&PollProgress {
                job_id: job_id.to_string(),
                attempt,
                max_attempts,
                phase,
                raw_status: raw_status.clone(),
                percent: snapshot.percent,
                stage_index: snapshot.stage_index,
                stage_label: snapshot.stage_label,
                elapsed,
            });

            match phase {
                JobPhase::Done => {
                    tracing::info!(
                        job_id = %job_id,
                        "[StatusPoller] Job finished after {} attempt(s)",
                        attempt
                    );
                    let artifact = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(cancelled(job_id, completed)),
                        artifact = self.materializer.fetch_result(job_id) => artifact?,
                    };
                    return Ok(PollOutcome::Completed(artifact));
                }
                JobPhase::Failed => {
                    tracing::warn!(job_id = %job_id, "[StatusPoller] Job failed");
                    return Err(JobflowError::job_failed(
                        job_id,
                        format!("backend reported status '{raw_status}'"),
                    ));
                }
                JobPhase::Queued | JobPhase::Active => {}
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            job_id = %job_id,
            "[StatusPoller] Attempt budget exhausted after {:?}; job may still be running",
            elapsed
        );
        Ok(PollOutcome::TimedOut {
            attempts: max_attempts,
            elapsed,
        })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<String> {
        let backend = &self.backend;
        self.credentials
            .authorized(|token| async move { backend.get_job_status(job_id, &token).await })
            .await
    }
}

fn cancelled(job_id: &str, attempts: u32) -> PollOutcome {
    tracing::info!(
        job_id = %job_id,
        "[StatusPoller] Cancelled after {} status check(s)",
        attempts
    );
    PollOutcome::Cancelled { attempts }
}

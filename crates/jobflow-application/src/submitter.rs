//! Job submission with bounded retry.

use jobflow_core::config::RetryPolicy;
use jobflow_core::error::AdmissionReason;
use jobflow_core::job::{JobBackend, JobPayload};
use jobflow_core::{JobflowError, Result};
use std::sync::Arc;

use crate::admission::OverageConfirmer;
use crate::credential_cache::CredentialCache;

/// Submission state machine. `Success` and `TerminalFailure` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    Idle,
    Attempting(u32),
    RetryableFailure(u32),
    Success,
    TerminalFailure,
}

/// Submits work to the backend, retrying transient transport failures.
pub struct JobSubmitter {
    backend: Arc<dyn JobBackend>,
    credentials: Arc<CredentialCache>,
    policy: RetryPolicy,
}

impl JobSubmitter {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        credentials: Arc<CredentialCache>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            credentials,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submits `payload` and returns the backend job id.
    ///
    /// Transient failures are retried up to `max_attempts` with linear
    /// backoff; when all attempts fail transiently the result is
    /// `ExhaustedRetries`. Any other error is returned as soon as it occurs.
    pub async fn submit(&self, payload: &JobPayload) -> Result<String> {
        self.submit_with_override(payload, false).await
    }

    /// Submits and, if the backend asks for overage confirmation, asks
    /// `confirmer` and re-submits exactly once with the override set.
    pub async fn submit_confirming(
        &self,
        payload: &JobPayload,
        confirmer: &dyn OverageConfirmer,
    ) -> Result<String> {
        match self.submit_with_override(payload, false).await {
            Err(JobflowError::OverageConfirmationRequired(quote)) => {
                if !confirmer.confirm(&quote).await {
                    return Err(JobflowError::admission(
                        AdmissionReason::OverageDeclined,
                        format!("overage of {} unit(s) declined", quote.overage_units),
                    ));
                }
                tracing::info!(
                    "[JobSubmitter] Re-submitting '{}' with overage confirmed; overage billing applies",
                    payload.title
                );
                match self.submit_with_override(payload, true).await {
                    Err(JobflowError::OverageConfirmationRequired(_)) => {
                        Err(JobflowError::admission(
                            AdmissionReason::OverageUnresolved,
                            "backend still requires overage confirmation after it was given",
                        ))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn submit_with_override(
        &self,
        payload: &JobPayload,
        confirm_overage: bool,
    ) -> Result<String> {
        payload.validate()?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = SubmitState::Idle;
        let mut last_error: Option<JobflowError> = None;

        for attempt in 1..=max_attempts {
            state = transition(state, SubmitState::Attempting(attempt));

            match self.attempt(payload, confirm_overage).await {
                Ok(job_id) => {
                    transition(state, SubmitState::Success);
                    tracing::info!(
                        job_id = %job_id,
                        "[JobSubmitter] Submitted {} job '{}' on attempt {}",
                        payload.kind,
                        payload.title,
                        attempt
                    );
                    return Ok(job_id);
                }
                Err(err) if err.is_retryable() => {
                    state = transition(state, SubmitState::RetryableFailure(attempt));
                    tracing::warn!(
                        "[JobSubmitter] Attempt {}/{} failed transiently: {}",
                        attempt,
                        max_attempts,
                        err
                    );
                    last_error = Some(err);

                    if attempt < max_attempts {
                        let delay = self.policy.backoff_after(attempt);
                        tracing::debug!("[JobSubmitter] Backing off for {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    transition(state, SubmitState::TerminalFailure);
                    tracing::warn!(
                        "[JobSubmitter] Attempt {} failed, not retrying: {}",
                        attempt,
                        err
                    );
                    return Err(err);
                }
            }
        }

        transition(state, SubmitState::TerminalFailure);
        Err(JobflowError::ExhaustedRetries {
            attempts: max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        })
    }

    /// One attempt: fresh credential, per-attempt timeout.
    async fn attempt(&self, payload: &JobPayload, confirm_overage: bool) -> Result<String> {
        let backend = &self.backend;
        let timeout = self.policy.attempt_timeout();

        self.credentials
            .authorized(|token| async move {
                match tokio::time::timeout(
                    timeout,
                    backend.submit_job(payload, &token, confirm_overage),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(JobflowError::timeout(format!(
                        "submission attempt timed out after {}s",
                        timeout.as_secs()
                    ))),
                }
            })
            .await
    }
}

fn transition(from: SubmitState, to: SubmitState) -> SubmitState {
    tracing::trace!("[JobSubmitter] {:?} -> {:?}", from, to);
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{AutoConfirmOverage, DeclineOverage};
    use async_trait::async_trait;
    use jobflow_core::error::TransportErrorKind;
    use jobflow_core::job::{Artifact, TokenGrant, TokenProvider};
    use jobflow_core::usage::OverageQuote;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct StaticTokens {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TokenProvider for StaticTokens {
        async fn acquire_token(&self) -> Result<TokenGrant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenGrant {
                access_token: format!("token-{n}"),
                expires_in: 3600,
            })
        }
    }

    enum Reply {
        Ok(&'static str),
        Err(JobflowError),
        Hang,
    }

    struct ScriptedBackend {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<(Instant, bool)>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn override_flags(&self) -> Vec<bool> {
            self.calls.lock().unwrap().iter().map(|(_, f)| *f).collect()
        }
    }

    #[async_trait]
    impl JobBackend for ScriptedBackend {
        async fn submit_job(
            &self,
            _payload: &JobPayload,
            _token: &str,
            confirm_overage: bool,
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), confirm_overage));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Err(JobflowError::internal("script exhausted")));
            match reply {
                Reply::Ok(id) => Ok(id.to_string()),
                Reply::Err(err) => Err(err),
                Reply::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn get_job_status(&self, _job_id: &str, _token: &str) -> Result<String> {
            Ok("pending".to_string())
        }

        async fn get_job_result(&self, job_id: &str, _token: &str) -> Result<Artifact> {
            Err(JobflowError::result_unavailable(job_id, "not scripted"))
        }
    }

    fn submitter(backend: Arc<ScriptedBackend>) -> (JobSubmitter, Arc<StaticTokens>) {
        let tokens = Arc::new(StaticTokens {
            calls: AtomicU32::new(0),
        });
        let cache = Arc::new(CredentialCache::new(tokens.clone(), Duration::from_secs(30)));
        (
            JobSubmitter::new(backend, cache, RetryPolicy::default()),
            tokens,
        )
    }

    fn payload() -> JobPayload {
        JobPayload::content_generation("Spring launch", vec!["https://example.com".into()])
    }

    fn timeout_error() -> JobflowError {
        JobflowError::transport(TransportErrorKind::Timeout, "request timed out")
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_timing_out_exhausts_retries() {
        let backend = ScriptedBackend::new(vec![
            Reply::Err(timeout_error()),
            Reply::Err(timeout_error()),
            Reply::Err(timeout_error()),
        ]);
        let (submitter, _) = submitter(backend.clone());

        let err = submitter.submit(&payload()).await.unwrap_err();
        assert!(matches!(err, JobflowError::ExhaustedRetries { attempts: 3, .. }));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear_between_attempts() {
        let backend = ScriptedBackend::new(vec![
            Reply::Err(timeout_error()),
            Reply::Err(JobflowError::transport_from_message("connection reset by peer")),
            Reply::Ok("job-9"),
        ]);
        let (submitter, _) = submitter(backend.clone());

        assert_eq!(submitter.submit(&payload()).await.unwrap(), "job-9");

        let times = backend.call_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_backoff_after_final_attempt() {
        let backend = ScriptedBackend::new(vec![
            Reply::Err(timeout_error()),
            Reply::Err(timeout_error()),
            Reply::Err(timeout_error()),
        ]);
        let (submitter, _) = submitter(backend.clone());
        let started = Instant::now();

        submitter.submit(&payload()).await.unwrap_err();

        // 1s + 2s of backoff, nothing after the third attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Reply::Err(JobflowError::validation(
            "brand info too long",
        ))]);
        let (submitter, _) = submitter(backend.clone());

        let err = submitter.submit(&payload()).await.unwrap_err();
        assert!(err.is_admission());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_limit_errors_surface_immediately() {
        let backend = ScriptedBackend::new(vec![Reply::Err(JobflowError::admission(
            AdmissionReason::DuplicateJob,
            "already running",
        ))]);
        let (duplicate, _) = submitter(backend.clone());
        assert!(duplicate.submit(&payload()).await.unwrap_err().is_admission());

        let backend = ScriptedBackend::new(vec![Reply::Err(JobflowError::UsageLimitExceeded {
            current_usage: 3,
            limit: 3,
        })]);
        let (limited, _) = submitter(backend.clone());
        assert!(matches!(
            limited.submit(&payload()).await.unwrap_err(),
            JobflowError::UsageLimitExceeded { .. }
        ));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_never_reaches_backend() {
        let backend = ScriptedBackend::new(vec![]);
        let (submitter, _) = submitter(backend.clone());
        let bad = JobPayload::content_generation("", vec![]);

        assert!(submitter.submit(&bad).await.unwrap_err().is_admission());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_is_cut_by_timeout_and_retried() {
        let backend = ScriptedBackend::new(vec![Reply::Hang, Reply::Ok("job-2")]);
        let (submitter, _) = submitter(backend.clone());
        let started = Instant::now();

        assert_eq!(submitter.submit(&payload()).await.unwrap(), "job-2");
        assert_eq!(started.elapsed(), Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_refreshes_token_within_attempt() {
        let backend = ScriptedBackend::new(vec![
            Reply::Err(JobflowError::auth("401")),
            Reply::Ok("job-3"),
        ]);
        let (submitter, tokens) = submitter(backend.clone());

        assert_eq!(submitter.submit(&payload()).await.unwrap(), "job-3");
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 2);
    }

    fn quote() -> JobflowError {
        JobflowError::OverageConfirmationRequired(OverageQuote {
            overage_units: 1,
            overage_cost: 9.0,
            currency: "USD".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_overage_confirmation_resubmits_once_with_flag() {
        let backend = ScriptedBackend::new(vec![Reply::Err(quote()), Reply::Ok("job-4")]);
        let (submitter, _) = submitter(backend.clone());

        let job_id = submitter
            .submit_confirming(&payload(), &AutoConfirmOverage)
            .await
            .unwrap();
        assert_eq!(job_id, "job-4");
        assert_eq!(backend.override_flags(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_confirmation_request_is_fatal() {
        let backend = ScriptedBackend::new(vec![Reply::Err(quote()), Reply::Err(quote())]);
        let (submitter, _) = submitter(backend.clone());

        let err = submitter
            .submit_confirming(&payload(), &AutoConfirmOverage)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobflowError::Admission {
                reason: AdmissionReason::OverageUnresolved,
                ..
            }
        ));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_overage_is_not_resubmitted() {
        let backend = ScriptedBackend::new(vec![Reply::Err(quote())]);
        let (submitter, _) = submitter(backend.clone());

        let err = submitter
            .submit_confirming(&payload(), &DeclineOverage)
            .await
            .unwrap_err();
        assert!(err.is_admission());
        assert_eq!(backend.call_count(), 1);
    }
}

use async_trait::async_trait;
use jobflow_application::{CredentialCache, InMemoryUsageLedger, ResultMaterializer};
use jobflow_core::avatar::{Avatar, AvatarSet, ExtractionMode};
use jobflow_core::config::{JobflowConfig, PollingProfile};
use jobflow_core::job::{
    Artifact, Job, JobBackend, JobFilter, JobKind, JobPatch, JobPayload, JobPhase, JobStore,
    TokenGrant, TokenProvider,
};
use jobflow_core::progress::ProgressSchedule;
use jobflow_core::usage::UsageType;
use jobflow_core::user::UserContext;
use jobflow_core::{JobflowError, Result};
use jobflow_execution::{Collaborators, JobRunner, PollOutcome, PollProgress, StatusPoller};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct CountingTokens {
    calls: AtomicU32,
}

#[async_trait]
impl TokenProvider for CountingTokens {
    async fn acquire_token(&self) -> Result<TokenGrant> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenGrant {
            access_token: format!("token-{n}"),
            expires_in: 3600,
        })
    }
}

/// Backend double: scripted status replies, "processing" once the script runs out.
#[derive(Default)]
struct MockBackend {
    statuses: Mutex<VecDeque<Result<String>>>,
    status_calls: Mutex<Vec<String>>,
    result_calls: Mutex<Vec<String>>,
    fail_results: bool,
    submitted: Mutex<Vec<JobPayload>>,
}

impl MockBackend {
    fn scripted(statuses: Vec<Result<&str>>) -> Self {
        Self {
            statuses: Mutex::new(
                statuses
                    .into_iter()
                    .map(|s| s.map(str::to_string))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn with_statuses(statuses: Vec<Result<&str>>) -> Arc<Self> {
        Arc::new(Self::scripted(statuses))
    }

    /// Scripted statuses; every result fetch fails.
    fn with_failing_result(statuses: Vec<Result<&str>>) -> Arc<Self> {
        Arc::new(Self {
            fail_results: true,
            ..Self::scripted(statuses)
        })
    }

    fn status_calls(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }

    fn result_calls(&self) -> Vec<String> {
        self.result_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobBackend for MockBackend {
    async fn submit_job(
        &self,
        payload: &JobPayload,
        _token: &str,
        _confirm_overage: bool,
    ) -> Result<String> {
        self.submitted.lock().unwrap().push(payload.clone());
        Ok("abc".to_string())
    }

    async fn get_job_status(&self, job_id: &str, _token: &str) -> Result<String> {
        self.status_calls.lock().unwrap().push(job_id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("processing".to_string()))
    }

    async fn get_job_result(&self, job_id: &str, _token: &str) -> Result<Artifact> {
        self.result_calls.lock().unwrap().push(job_id.to_string());
        if self.fail_results {
            return Err(JobflowError::transport_from_message("connection reset"));
        }
        Ok(Artifact {
            job_id: job_id.to_string(),
            kind: JobKind::ContentGeneration,
            content: serde_json::json!({"html": "<h1>Done</h1>"}),
        })
    }
}

struct EmptyStore;

#[async_trait]
impl JobStore for EmptyStore {
    async fn update_job(&self, job_id: &str, _patch: &JobPatch, _token: &str) -> Result<Job> {
        Err(JobflowError::not_found("job", job_id))
    }

    async fn delete_job(&self, _job_id: &str, _token: &str) -> Result<()> {
        Ok(())
    }

    async fn list_jobs(&self, _filter: &JobFilter, _token: &str) -> Result<Vec<Job>> {
        Ok(Vec::new())
    }
}

fn poller(backend: Arc<MockBackend>) -> StatusPoller {
    let tokens = Arc::new(CountingTokens {
        calls: AtomicU32::new(0),
    });
    let credentials = Arc::new(CredentialCache::new(tokens, Duration::from_secs(30)));
    let materializer = Arc::new(ResultMaterializer::new(backend.clone(), credentials.clone()));
    StatusPoller::new(backend, credentials, materializer)
}

fn profile(max_attempts: u32) -> PollingProfile {
    PollingProfile {
        interval_secs: 5,
        max_attempts,
        schedule: ProgressSchedule::content_generation(),
    }
}

fn runner(backend: Arc<MockBackend>, ledger: Arc<InMemoryUsageLedger>) -> JobRunner {
    runner_with_tokens(backend, ledger).0
}

fn runner_with_tokens(
    backend: Arc<MockBackend>,
    ledger: Arc<InMemoryUsageLedger>,
) -> (JobRunner, Arc<CountingTokens>) {
    let tokens = Arc::new(CountingTokens {
        calls: AtomicU32::new(0),
    });
    let collaborators = Collaborators {
        tokens: tokens.clone(),
        backend,
        usage: ledger,
        store: Arc::new(EmptyStore),
    };
    (JobRunner::new(JobflowConfig::default(), collaborators), tokens)
}

fn user() -> UserContext {
    UserContext::new("user-1", "org-1")
}

#[tokio::test(start_paused = true)]
async fn test_submit_poll_complete_scenario() {
    let backend = MockBackend::with_statuses(vec![
        Ok("processing"),
        Ok("processing"),
        Ok("processing"),
        Ok("succeeded"),
    ]);
    let runner = runner(backend.clone(), Arc::new(InMemoryUsageLedger::new()));
    let payload = JobPayload::content_generation("Spring launch", vec!["https://a.com".into()]);
    let progress = Mutex::new(Vec::<PollProgress>::new());

    let (ticket, outcome) = runner
        .run(
            &user(),
            &payload,
            |p| progress.lock().unwrap().push(p.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ticket.job_id, "abc");
    assert_eq!(outcome.artifact().unwrap().job_id, "abc");
    assert_eq!(backend.status_calls(), 4);
    assert_eq!(backend.result_calls(), vec!["abc"]);

    let progress = progress.into_inner().unwrap();
    assert_eq!(progress.len(), 4);
    assert!(progress[..3].iter().all(|p| p.percent < 100.0));
    assert!(progress.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(progress[3].phase, JobPhase::Done);
    assert_eq!(progress[3].percent, 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_further_calls() {
    let backend = MockBackend::with_statuses(vec![]);
    let poller = poller(backend.clone());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let outcome = poller
        .poll_until_terminal(
            "abc",
            &profile(180),
            move |p| {
                if p.attempt == 2 {
                    trigger.cancel();
                }
            },
            &cancel,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 2 }));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.status_calls(), 2);
    assert!(backend.result_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhaustion_is_soft_timeout() {
    let backend = MockBackend::with_statuses(vec![]);
    let poller = poller(backend.clone());

    let outcome = poller
        .poll_until_terminal("abc", &profile(3), |_| {}, &CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        PollOutcome::TimedOut { attempts, elapsed } => {
            assert_eq!(attempts, 3);
            assert_eq!(elapsed, Duration::from_secs(15));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(backend.status_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_is_job_failed() {
    let backend = MockBackend::with_statuses(vec![Ok("running"), Ok("FAILURE")]);
    let poller = poller(backend.clone());

    let err = poller
        .poll_until_terminal("abc", &profile(10), |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, JobflowError::JobFailed { ref job_id, .. } if job_id == "abc"));
    assert_eq!(backend.status_calls(), 2);
    assert!(backend.result_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_done_with_failed_fetch_is_result_unavailable() {
    let backend = MockBackend::with_failing_result(vec![Ok("processing"), Ok("completed")]);
    let poller = poller(backend.clone());
    let mut last_percent = 0.0;

    let err = poller
        .poll_until_terminal(
            "abc",
            &profile(10),
            |p| last_percent = p.percent,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, JobflowError::ResultUnavailable { ref job_id, .. } if job_id == "abc"));
    assert_eq!(last_percent, 100.0);
    assert_eq!(backend.status_calls(), 2);
    assert_eq!(backend.result_calls(), vec!["abc"]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_job_ends_polling() {
    let backend = MockBackend::with_statuses(vec![Err(JobflowError::not_found("job", "abc"))]);
    let poller = poller(backend.clone());

    let err = poller
        .poll_until_terminal("abc", &profile(180), |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(backend.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_absorbed() {
    let backend = MockBackend::with_statuses(vec![
        Err(JobflowError::timeout("slow")),
        Ok("processing"),
        Err(JobflowError::transport_from_message("connection reset")),
        Ok("COMPLETED"),
    ]);
    let poller = poller(backend.clone());

    let outcome = poller
        .poll_until_terminal("abc", &profile(10), |_| {}, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(backend.status_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_error_on_final_attempt_surfaces() {
    let backend = MockBackend::with_statuses(vec![
        Ok("processing"),
        Err(JobflowError::timeout("slow")),
    ]);
    let poller = poller(backend.clone());

    let err = poller
        .poll_until_terminal("abc", &profile(2), |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test(start_paused = true)]
async fn test_auth_rejected_twice_is_fatal() {
    let backend = MockBackend::with_statuses(vec![
        Err(JobflowError::auth("401")),
        Err(JobflowError::auth("401")),
    ]);
    let poller = poller(backend.clone());

    let err = poller
        .poll_until_terminal("abc", &profile(10), |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_ends_tracking() {
    let backend = MockBackend::with_statuses(vec![]);
    let runner = runner(backend.clone(), Arc::new(InMemoryUsageLedger::new()));

    let cancel = CancellationToken::new();
    let track = runner.track("abc", JobKind::ContentGeneration, |_| {}, &cancel);
    let stop = async {
        tokio::time::sleep(Duration::from_secs(12)).await;
        runner.shutdown();
    };
    let (outcome, ()) = tokio::join!(track, stop);

    assert!(matches!(outcome.unwrap(), PollOutcome::Cancelled { attempts: 2 }));
    assert!(runner.is_shut_down());
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancel_ends_tracking() {
    let backend = MockBackend::with_statuses(vec![]);
    let runner = runner(backend.clone(), Arc::new(InMemoryUsageLedger::new()));
    let cancel = CancellationToken::new();

    let track = runner.track("abc", JobKind::AvatarExtraction, |_| {}, &cancel);
    let stop = async {
        // Extraction polls every 10s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
    };
    let (outcome, ()) = tokio::join!(track, stop);

    assert!(matches!(outcome.unwrap(), PollOutcome::Cancelled { attempts: 2 }));
    assert!(!runner.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_usage_limit_blocks_submission() {
    let backend = MockBackend::with_statuses(vec![]);
    let ledger = Arc::new(InMemoryUsageLedger::new().with_limit(UsageType::PreLander, 3));
    ledger.seed(&user(), UsageType::PreLander, 3).unwrap();
    let runner = runner(backend.clone(), ledger);
    let payload = JobPayload::content_generation("Spring launch", vec!["https://a.com".into()]);

    let err = runner.submit(&user(), &payload).await.unwrap_err();
    assert!(matches!(
        err,
        JobflowError::UsageLimitExceeded {
            current_usage: 3,
            limit: 3
        }
    ));
    assert!(backend.submitted.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_extraction_is_not_metered() {
    let backend = MockBackend::with_statuses(vec![]);
    let ledger = Arc::new(InMemoryUsageLedger::new());
    let runner = runner(backend.clone(), ledger);
    let payload = JobPayload::avatar_extraction(
        "parent",
        "Find avatars",
        vec!["https://a.com".into()],
        ExtractionMode::Focused,
    );

    let ticket = runner.submit(&user(), &payload).await.unwrap();
    assert!(ticket.admission.is_none());
    assert_eq!(
        runner
            .usage(&user(), UsageType::PreLander)
            .await
            .unwrap()
            .current_usage,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_research_selection_marks_avatar_and_submits() {
    let backend = MockBackend::with_statuses(vec![]);
    let runner = runner(backend.clone(), Arc::new(InMemoryUsageLedger::new()));
    let mut avatars = AvatarSet::from_extraction(
        ExtractionMode::Exploratory,
        vec![
            Avatar::new("Busy Mom", "Short on time"),
            Avatar::broad("Everyone", "Broad audience"),
        ],
    )
    .unwrap();

    let ticket = runner
        .start_research(&user(), "parent", &mut avatars, 0)
        .await
        .unwrap();

    assert_eq!(ticket.kind, JobKind::DeepResearch);
    assert_eq!(ticket.admission.unwrap().current_usage, 1);
    assert!(avatars.as_slice()[0].is_researched);
    assert!(avatars.add(Avatar::new("Late", "too late")).is_err());

    let submitted = backend.submitted.lock().unwrap();
    assert_eq!(submitted[0].avatars[0].persona_name, "Busy Mom");
    assert_eq!(submitted[0].parent_job_id.as_deref(), Some("parent"));
}

#[tokio::test(start_paused = true)]
async fn test_runner_calls_share_one_cached_token() {
    let backend = MockBackend::with_statuses(vec![]);
    let ledger = Arc::new(InMemoryUsageLedger::new().with_limit(UsageType::PreLander, 3));
    let (runner, tokens) = runner_with_tokens(backend, ledger);
    let payload = JobPayload::content_generation("Spring launch", vec!["https://a.com".into()]);

    runner.submit(&user(), &payload).await.unwrap();
    runner.usage(&user(), UsageType::PreLander).await.unwrap();
    runner.reconciler().refresh(&JobFilter::default()).await.unwrap();
    runner.reconciler().refresh(&JobFilter::default()).await.unwrap();

    assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
}

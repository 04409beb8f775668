//! Per-session entry point tying admission, submission, polling and results.

use jobflow_application::{
    Admission, AdmissionController, AutoConfirmOverage, CredentialCache, JobSubmitter,
    ListReconciler, OverageConfirmer, ResultMaterializer,
};
use jobflow_core::avatar::AvatarSet;
use jobflow_core::config::JobflowConfig;
use jobflow_core::job::{Artifact, JobBackend, JobKind, JobPayload, JobStore, TokenProvider};
use jobflow_core::usage::{UsageRecord, UsageService, UsageType};
use jobflow_core::user::UserContext;
use jobflow_core::Result;
use jobflow_interaction::HttpJobBackend;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::poller::{PollOutcome, PollProgress, StatusPoller};

/// The collaborators a runner talks to.
///
/// Every backend call made through them authenticates with tokens from
/// `tokens`, cached once per runner.
#[derive(Clone)]
pub struct Collaborators {
    pub tokens: Arc<dyn TokenProvider>,
    pub backend: Arc<dyn JobBackend>,
    pub usage: Arc<dyn UsageService>,
    pub store: Arc<dyn JobStore>,
}

impl Collaborators {
    /// Uses one HTTP client for every collaborator.
    pub fn http(backend: HttpJobBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            tokens: backend.clone(),
            backend: backend.clone(),
            usage: backend.clone(),
            store: backend,
        }
    }
}

/// A submitted job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: String,
    pub kind: JobKind,
    /// Present for metered kinds.
    pub admission: Option<Admission>,
}

/// Session context constructed once and shared by every job the session runs.
///
/// Every polling session started through [`track`](Self::track) hangs off
/// one root cancellation token; [`shutdown`](Self::shutdown) ends all of them.
pub struct JobRunner {
    config: JobflowConfig,
    credentials: Arc<CredentialCache>,
    admission: AdmissionController,
    submitter: JobSubmitter,
    materializer: Arc<ResultMaterializer>,
    poller: StatusPoller,
    reconciler: ListReconciler,
    confirmer: Arc<dyn OverageConfirmer>,
    shutdown: CancellationToken,
}

impl JobRunner {
    /// Creates a runner; overage is auto-confirmed until
    /// [`with_confirmer`](Self::with_confirmer) says otherwise.
    pub fn new(config: JobflowConfig, collaborators: Collaborators) -> Self {
        let credentials = Arc::new(CredentialCache::new(
            collaborators.tokens,
            config.credentials.token_margin(),
        ));
        let materializer = Arc::new(ResultMaterializer::new(
            collaborators.backend.clone(),
            credentials.clone(),
        ));

        Self {
            admission: AdmissionController::new(collaborators.usage, credentials.clone()),
            submitter: JobSubmitter::new(
                collaborators.backend.clone(),
                credentials.clone(),
                config.retry.clone(),
            ),
            poller: StatusPoller::new(
                collaborators.backend,
                credentials.clone(),
                materializer.clone(),
            ),
            reconciler: ListReconciler::new(collaborators.store, credentials.clone()),
            materializer,
            credentials,
            confirmer: Arc::new(AutoConfirmOverage),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Builds an HTTP-backed runner from the config file and environment.
    pub fn from_env() -> Result<Self> {
        let config = JobflowConfig::from_env()?;
        Self::from_config(config)
    }

    pub fn from_config(config: JobflowConfig) -> Result<Self> {
        let backend = HttpJobBackend::from_config(&config)?;
        Ok(Self::new(config, Collaborators::http(backend)))
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn OverageConfirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn config(&self) -> &JobflowConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn reconciler(&self) -> &ListReconciler {
        &self.reconciler
    }

    /// Validates, admits metered kinds, then submits.
    pub async fn submit(&self, user: &UserContext, payload: &JobPayload) -> Result<JobTicket> {
        payload.validate()?;

        let admission = match payload.kind.usage_type() {
            Some(usage_type) => Some(
                self.admission
                    .admit(user, usage_type, self.confirmer.as_ref())
                    .await?,
            ),
            None => None,
        };
        if admission.as_ref().is_some_and(|a| a.overage) {
            tracing::info!(
                "[JobRunner] Submitting '{}' past the weekly limit; overage billing applies",
                payload.title
            );
        }

        let job_id = self
            .submitter
            .submit_confirming(payload, self.confirmer.as_ref())
            .await?;

        Ok(JobTicket {
            job_id,
            kind: payload.kind,
            admission,
        })
    }

    /// Polls `job_id` with the profile configured for `kind`.
    ///
    /// The session ends when `cancel` fires, when the runner shuts down, or
    /// on any terminal outcome.
    pub async fn track<F>(
        &self,
        job_id: &str,
        kind: JobKind,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome>
    where
        F: FnMut(&PollProgress) + Send,
    {
        let session = self.shutdown.child_token();
        let profile = self.config.polling.profile_for(kind);
        let poll = self
            .poller
            .poll_until_terminal(job_id, profile, on_progress, &session);
        tokio::pin!(poll);

        tokio::select! {
            biased;
            outcome = &mut poll => outcome,
            _ = cancel.cancelled() => {
                session.cancel();
                poll.await
            }
        }
    }

    /// Submits and tracks in one call.
    pub async fn run<F>(
        &self,
        user: &UserContext,
        payload: &JobPayload,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<(JobTicket, PollOutcome)>
    where
        F: FnMut(&PollProgress) + Send,
    {
        let ticket = self.submit(user, payload).await?;
        let outcome = self
            .track(&ticket.job_id, ticket.kind, on_progress, cancel)
            .await?;
        Ok((ticket, outcome))
    }

    /// Selects one avatar for deep research and submits the research job.
    ///
    /// The selection is recorded before submission and stays recorded if the
    /// submission fails.
    pub async fn start_research(
        &self,
        user: &UserContext,
        parent_job_id: &str,
        avatars: &mut AvatarSet,
        index: usize,
    ) -> Result<JobTicket> {
        let avatar = avatars.mark_researched(index)?;
        let title = format!("Deep research: {}", avatar.persona_name);
        let payload = JobPayload::deep_research(parent_job_id, title, avatar);
        self.submit(user, &payload).await
    }

    /// Re-fetches the artifact of a job that finished but whose result fetch failed.
    pub async fn fetch_result(&self, job_id: &str) -> Result<Artifact> {
        self.materializer.fetch_result(job_id).await
    }

    pub async fn usage(&self, user: &UserContext, usage_type: UsageType) -> Result<UsageRecord> {
        self.admission.usage(user, usage_type).await
    }

    /// A token that is cancelled with the runner.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancels every polling session started by this runner.
    pub fn shutdown(&self) {
        tracing::info!("[JobRunner] Shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

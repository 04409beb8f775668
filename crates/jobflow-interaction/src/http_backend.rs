//! HttpJobBackend - the remote job backend over HTTP.
//!
//! One client implements every collaborator trait the orchestration layer
//! needs: token issuance, job submission and status, usage admission and the
//! job list. Apart from token issuance every call takes the bearer token
//! from the caller's credential cache.

use async_trait::async_trait;
use jobflow_core::config::JobflowConfig;
use jobflow_core::job::{
    Artifact, Job, JobBackend, JobFilter, JobKind, JobPatch, JobPayload, JobStore, TokenGrant,
    TokenProvider,
};
use jobflow_core::usage::{OverageQuote, UsageCheck, UsageRecord, UsageService, UsageType};
use jobflow_core::user::UserContext;
use jobflow_core::{JobflowError, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::response::{map_error_response, map_transport_error};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the job backend.
#[derive(Clone)]
pub struct HttpJobBackend {
    client: Client,
    base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    #[serde(flatten)]
    payload: &'a JobPayload,
    confirm_overage: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    kind: JobKind,
    content: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct UsageCheckRequest<'a> {
    user_id: &'a str,
    organization_id: &'a str,
    usage_type: UsageType,
    confirm_overage: bool,
}

#[derive(Debug, Deserialize)]
struct UsageCheckResponse {
    allowed: bool,
    current_usage: u32,
    limit: u32,
    #[serde(default)]
    requires_confirmation: bool,
    #[serde(default)]
    overage: Option<OverageQuote>,
}

impl UsageCheckResponse {
    fn into_check(self) -> UsageCheck {
        match (self.allowed, self.requires_confirmation, self.overage) {
            (true, _, _) => UsageCheck::Allowed {
                current_usage: self.current_usage,
                limit: self.limit,
            },
            (false, true, Some(quote)) => UsageCheck::ConfirmationRequired(quote),
            (false, _, _) => UsageCheck::NotAllowed {
                current_usage: self.current_usage,
                limit: self.limit,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobListResponse {
    jobs: Vec<Job>,
}

impl HttpJobBackend {
    /// Creates a backend client with explicit configuration.
    pub fn new(
        base_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Builds the client from the environment-selected endpoint and credentials.
    pub fn from_config(config: &JobflowConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| JobflowError::config(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            "[HttpJobBackend] Using {} ({:?}), client credentials: {}",
            config.api_base_url(),
            config.environment,
            if config.credentials.client_id.is_some() {
                "present"
            } else {
                "none"
            }
        );

        Ok(Self {
            client,
            base_url: config.api_base_url().trim_end_matches('/').to_string(),
            client_id: config.credentials.client_id.clone(),
            client_secret: config.credentials.client_secret.clone(),
            request_timeout: config.retry.attempt_timeout(),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Adds the bearer token and the per-request timeout.
    fn auth_request(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.bearer_auth(token).timeout(self.request_timeout)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| map_transport_error(&e))
    }

    async fn read_json<T: DeserializeOwned>(response: Response, job_id: Option<&str>) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_error_response(status.as_u16(), &error_text, job_id));
        }
        response.json::<T>().await.map_err(|e| map_transport_error(&e))
    }

    async fn expect_success(response: Response, job_id: Option<&str>) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(map_error_response(status.as_u16(), &error_text, job_id))
    }
}

#[async_trait]
impl TokenProvider for HttpJobBackend {
    async fn acquire_token(&self) -> Result<TokenGrant> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(JobflowError::config(
                "client credentials are not configured (JOBFLOW_CLIENT_ID / JOBFLOW_CLIENT_SECRET)",
            ));
        };

        let request = self
            .client
            .post(self.url("/auth/token"))
            .timeout(self.request_timeout)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id,
                client_secret,
            });
        let grant: TokenGrant = Self::read_json(Self::send(request).await?, None).await?;
        tracing::debug!(
            "[HttpJobBackend] Token issued, expires in {}s",
            grant.expires_in
        );
        Ok(grant)
    }
}

#[async_trait]
impl JobBackend for HttpJobBackend {
    async fn submit_job(
        &self,
        payload: &JobPayload,
        token: &str,
        confirm_overage: bool,
    ) -> Result<String> {
        let request = self.auth_request(self.client.post(self.url("/jobs")), token).json(
            &SubmitRequest {
                payload,
                confirm_overage,
            },
        );
        let response: SubmitResponse = Self::read_json(Self::send(request).await?, None).await?;
        Ok(response.job_id)
    }

    async fn get_job_status(&self, job_id: &str, token: &str) -> Result<String> {
        let request = self.auth_request(
            self.client.get(self.url(&format!("/jobs/{job_id}/status"))),
            token,
        );
        let response: StatusResponse =
            Self::read_json(Self::send(request).await?, Some(job_id)).await?;
        Ok(response.status)
    }

    async fn get_job_result(&self, job_id: &str, token: &str) -> Result<Artifact> {
        let request = self.auth_request(
            self.client.get(self.url(&format!("/jobs/{job_id}/result"))),
            token,
        );
        let response: ResultResponse =
            Self::read_json(Self::send(request).await?, Some(job_id)).await?;
        Ok(Artifact {
            job_id: job_id.to_string(),
            kind: response.kind,
            content: response.content,
        })
    }
}

#[async_trait]
impl UsageService for HttpJobBackend {
    async fn check_and_increment(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        confirm_overage: bool,
        token: &str,
    ) -> Result<UsageCheck> {
        let request = self
            .auth_request(self.client.post(self.url("/usage/check")), token)
            .json(&UsageCheckRequest {
                user_id: &user.user_id,
                organization_id: &user.organization_id,
                usage_type,
                confirm_overage,
            });

        match Self::read_json::<UsageCheckResponse>(Self::send(request).await?, None).await {
            Ok(response) => Ok(response.into_check()),
            Err(JobflowError::OverageConfirmationRequired(quote)) => {
                Ok(UsageCheck::ConfirmationRequired(quote))
            }
            Err(JobflowError::UsageLimitExceeded {
                current_usage,
                limit,
            }) => Ok(UsageCheck::NotAllowed {
                current_usage,
                limit,
            }),
            Err(e) => Err(e),
        }
    }

    async fn usage(
        &self,
        user: &UserContext,
        usage_type: UsageType,
        token: &str,
    ) -> Result<UsageRecord> {
        let request = self
            .auth_request(
                self.client.get(self.url(&format!("/usage/{usage_type}"))),
                token,
            )
            .query(&[("organization_id", user.organization_id.as_str())]);
        Self::read_json(Self::send(request).await?, None).await
    }
}

#[async_trait]
impl JobStore for HttpJobBackend {
    async fn update_job(&self, job_id: &str, patch: &JobPatch, token: &str) -> Result<Job> {
        let request = self
            .auth_request(self.client.patch(self.url(&format!("/jobs/{job_id}"))), token)
            .json(patch);
        Self::read_json(Self::send(request).await?, Some(job_id)).await
    }

    async fn delete_job(&self, job_id: &str, token: &str) -> Result<()> {
        let request =
            self.auth_request(self.client.delete(self.url(&format!("/jobs/{job_id}"))), token);
        Self::expect_success(Self::send(request).await?, Some(job_id)).await
    }

    async fn list_jobs(&self, filter: &JobFilter, token: &str) -> Result<Vec<Job>> {
        let mut request = self.auth_request(self.client.get(self.url("/jobs")), token);
        if let Some(kind) = filter.kind {
            request = request.query(&[("kind", kind.to_string())]);
        }
        if let Some(needle) = &filter.title_contains {
            request = request.query(&[("q", needle.as_str())]);
        }

        let response: JobListResponse = Self::read_json(Self::send(request).await?, None).await?;
        // The backend does not know local phases; filter again here.
        Ok(response
            .jobs
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect())
    }
}

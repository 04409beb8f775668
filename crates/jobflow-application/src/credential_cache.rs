use jobflow_core::credential::Credential;
use jobflow_core::job::TokenProvider;
use jobflow_core::{JobflowError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Caches the backend access token and refreshes it on expiry or 401/403.
///
/// The expiry check and the refresh run under one lock, so concurrent callers
/// that find the token stale trigger a single acquisition.
pub struct CredentialCache {
    provider: Arc<dyn TokenProvider>,
    margin: Duration,
    current: Mutex<Option<Credential>>,
}

impl CredentialCache {
    /// Creates an empty cache.
    ///
    /// # Arguments
    ///
    /// * `provider` - Issues fresh tokens
    /// * `margin` - Subtracted from each token's lifetime
    pub fn new(provider: Arc<dyn TokenProvider>, margin: Duration) -> Self {
        Self {
            provider,
            margin,
            current: Mutex::new(None),
        }
    }

    /// Returns the cached token, acquiring a new one when it is missing or
    /// inside the expiry margin.
    pub async fn ensure_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;
        let now = Instant::now();

        if let Some(credential) = current
            .as_ref()
            .filter(|c| c.is_valid_at(now, self.margin))
        {
            return Ok(credential.access_token.clone());
        }

        tracing::debug!("[CredentialCache] Acquiring access token");
        let grant = self.provider.acquire_token().await?;
        let credential = Credential::from_grant(grant, now);
        tracing::debug!(
            "[CredentialCache] Token acquired, valid for {}s",
            credential.ttl.saturating_sub(self.margin).as_secs()
        );

        let token = credential.access_token.clone();
        *current = Some(credential);
        Ok(token)
    }

    /// Drops the cached token.
    pub async fn invalidate(&self) {
        self.current.lock().await.take();
    }

    /// Drops the cached token only if it is still `token`, so a refresh done
    /// by another caller in the meantime is kept.
    async fn invalidate_token(&self, token: &str) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|c| c.access_token == token) {
            current.take();
        }
    }

    /// Runs `op` with a valid token.
    ///
    /// On an authorization failure the cache is invalidated, one fresh token
    /// is acquired and `op` is retried once. A second authorization failure
    /// is returned as `JobflowError::Auth`.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.ensure_token().await?;
        match op(token.clone()).await {
            Err(err) if err.is_auth() => {
                tracing::warn!("[CredentialCache] Authorization rejected, refreshing token: {err}");
                self.invalidate_token(&token).await;
                let fresh = self.ensure_token().await?;
                match op(fresh).await {
                    Err(err) if err.is_auth() => {
                        tracing::error!("[CredentialCache] Authorization rejected after refresh");
                        Err(JobflowError::auth(format!(
                            "rejected after token refresh: {err}"
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}

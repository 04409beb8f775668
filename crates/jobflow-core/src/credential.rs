//! Short-lived bearer credential for the job backend.

use std::time::Duration;
use tokio::time::Instant;

use crate::job::TokenGrant;

/// A cached access token with its issuance time.
///
/// `issued_at` uses the tokio clock so paused-time tests can expire it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub issued_at: Instant,
    pub ttl: Duration,
}

impl Credential {
    pub fn from_grant(grant: TokenGrant, issued_at: Instant) -> Self {
        Self {
            access_token: grant.access_token,
            issued_at,
            ttl: Duration::from_secs(grant.expires_in),
        }
    }

    /// Last instant (exclusive) at which the token is still handed out.
    pub fn usable_until(&self, margin: Duration) -> Instant {
        self.issued_at + self.ttl.saturating_sub(margin)
    }

    /// Valid while `now < issued_at + ttl - margin`.
    pub fn is_valid_at(&self, now: Instant, margin: Duration) -> bool {
        now < self.usable_until(margin)
    }
}

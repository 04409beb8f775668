//! Error types for jobflow.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::usage::OverageQuote;

/// Transport failure classes observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The client gave up waiting (per-attempt timeout or abort).
    Timeout,
    /// The connection was reset or refused mid-flight.
    ConnectionReset,
    /// Host name resolution failed.
    Dns,
    /// The gateway in front of the backend reported a temporary outage (502/503/504).
    Unavailable,
    /// Anything else the transport reported.
    Other,
}

/// Why an admission was refused without consuming retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionReason {
    /// An identical job is already queued or running.
    DuplicateJob,
    /// The payload failed validation, locally or on the backend.
    Validation,
    /// The backend rejected the request shape.
    BadRequest,
    /// The backend still asked for overage confirmation after it was given.
    OverageUnresolved,
    /// The overage was offered and declined.
    OverageDeclined,
}

/// A shared error type for every jobflow crate.
#[derive(Error, Debug, Clone, Serialize)]
pub enum JobflowError {
    /// Transient transport failure (timeout, reset, DNS, gateway).
    #[error("Transport error ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// Duplicate job or validation failure. Never retried.
    #[error("Admission rejected ({reason:?}): {message}")]
    Admission {
        reason: AdmissionReason,
        message: String,
    },

    /// Weekly quota reached and no override was given.
    #[error("Usage limit exceeded: {current_usage}/{limit}")]
    UsageLimitExceeded { current_usage: u32, limit: u32 },

    /// The backend wants the caller to confirm billable overage first.
    #[error(
        "Overage confirmation required: {} unit(s), {} {}",
        .0.overage_units,
        .0.overage_cost,
        .0.currency
    )]
    OverageConfirmationRequired(OverageQuote),

    /// Authorization failed (401/403).
    #[error("Authorization error: {0}")]
    Auth(String),

    /// The backend reported the job as failed.
    #[error("Job '{job_id}' failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// The job succeeded but its artifact could not be fetched.
    #[error("Result unavailable for job '{job_id}': {message}")]
    ResultUnavailable { job_id: String, message: String },

    /// Every submission attempt hit a transient failure.
    #[error("Gave up after {attempts} attempt(s): {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

static TRANSIENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(timed?\s?out|timeout|abort|econnreset|connection (reset|closed|refused)|broken pipe|dns|enotfound|eai_again|name resolution|network|socket hang up|temporarily unavailable|bad gateway|gateway timeout|service unavailable)",
    )
    .expect("transient error pattern is valid")
});

impl TransportErrorKind {
    /// Guesses the kind from free-form transport error text.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("dns")
            || lower.contains("enotfound")
            || lower.contains("eai_again")
            || lower.contains("name resolution")
        {
            Self::Dns
        } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("abort")
        {
            Self::Timeout
        } else if lower.contains("reset")
            || lower.contains("refused")
            || lower.contains("broken pipe")
            || lower.contains("hang up")
        {
            Self::ConnectionReset
        } else if lower.contains("unavailable") || lower.contains("gateway") {
            Self::Unavailable
        } else {
            Self::Other
        }
    }
}

impl JobflowError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transport error, deriving its kind from the message text.
    pub fn transport_from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Transport {
            kind: TransportErrorKind::classify(&message),
            message,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorKind::Timeout, message)
    }

    pub fn admission(reason: AdmissionReason, message: impl Into<String>) -> Self {
        Self::Admission {
            reason,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::admission(AdmissionReason::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn job_failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    pub fn result_unavailable(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResultUnavailable {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Whether the submitter may spend another attempt on this error.
    ///
    /// Returns true for transport errors of a known transient kind, and for
    /// `Other` transport errors whose text matches the transient pattern set.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, message } => match kind {
                TransportErrorKind::Other => TRANSIENT_PATTERN.is_match(message),
                _ => true,
            },
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_admission(&self) -> bool {
        matches!(self, Self::Admission { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the quote when the backend asked for overage confirmation.
    pub fn overage_quote(&self) -> Option<&OverageQuote> {
        match self {
            Self::OverageConfirmationRequired(quote) => Some(quote),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for JobflowError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for JobflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for JobflowError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, JobflowError>`.
pub type Result<T> = std::result::Result<T, JobflowError>;

//! Mapping of backend HTTP failures onto `JobflowError`.

use jobflow_core::JobflowError;
use jobflow_core::error::{AdmissionReason, TransportErrorKind};
use jobflow_core::usage::OverageQuote;
use serde::Deserialize;

const OVERAGE_CONFIRMATION_REQUIRED: &str = "overage_confirmation_required";
const DUPLICATE_JOB: &str = "duplicate_job";

/// `{"error": {"code": ..., "message": ..., ...}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    current_usage: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    overage_units: Option<u32>,
    #[serde(default)]
    overage_cost: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

impl ErrorDetail {
    fn parse(body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => envelope.error,
            Err(_) => {
                let trimmed = body.trim();
                Self {
                    message: (!trimmed.is_empty()).then(|| trimmed.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    fn quote(&self) -> OverageQuote {
        OverageQuote {
            overage_units: self.overage_units.unwrap_or(1),
            overage_cost: self.overage_cost.unwrap_or(0.0),
            currency: self.currency.clone().unwrap_or_else(|| "USD".to_string()),
        }
    }
}

/// Translates a non-success response into the error taxonomy.
///
/// # Arguments
///
/// * `status` - HTTP status code
/// * `body` - Raw response body, JSON error envelope or plain text
/// * `job_id` - Job the request was about, used for not-found errors
pub fn map_error_response(status: u16, body: &str, job_id: Option<&str>) -> JobflowError {
    let detail = ErrorDetail::parse(body);
    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| format!("HTTP {status}"));

    match detail.code.as_deref() {
        Some(OVERAGE_CONFIRMATION_REQUIRED) => {
            return JobflowError::OverageConfirmationRequired(detail.quote());
        }
        Some(DUPLICATE_JOB) => {
            return JobflowError::admission(AdmissionReason::DuplicateJob, message);
        }
        _ => {}
    }

    match status {
        401 | 403 => JobflowError::auth(message),
        404 => JobflowError::not_found("job", job_id.unwrap_or(&message)),
        409 => JobflowError::admission(AdmissionReason::DuplicateJob, message),
        400 => JobflowError::admission(AdmissionReason::BadRequest, message),
        422 => JobflowError::validation(message),
        429 => JobflowError::UsageLimitExceeded {
            current_usage: detail.current_usage.unwrap_or(0),
            limit: detail.limit.unwrap_or(0),
        },
        408 => JobflowError::transport(TransportErrorKind::Timeout, message),
        502..=504 => JobflowError::transport(TransportErrorKind::Unavailable, message),
        500..=599 => JobflowError::transport_from_message(message),
        _ => JobflowError::internal(format!("unexpected HTTP {status}: {message}")),
    }
}

/// Classifies a failure reported by the HTTP client itself.
pub fn map_transport_error(err: &reqwest::Error) -> JobflowError {
    let message = error_chain(err);

    if err.is_timeout() {
        return JobflowError::transport(TransportErrorKind::Timeout, message);
    }
    if err.is_decode() {
        return JobflowError::Serialization {
            format: "json".to_string(),
            message,
        };
    }

    let kind = match TransportErrorKind::classify(&message) {
        TransportErrorKind::Other if err.is_connect() => TransportErrorKind::ConnectionReset,
        kind => kind,
    };
    JobflowError::transport(kind, message)
}

/// reqwest's top-level message rarely names the cause; join the source chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

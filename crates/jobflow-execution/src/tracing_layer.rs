//! Tracing layer that streams job activity to a UI.
//!
//! Every event carrying a `job_id` field is forwarded to a tokio channel, so a
//! front end can show submission, polling and result activity per job without
//! hooking into each component.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Event data sent to the channel
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobEvent {
    pub job_id: String,
    /// Event target (e.g., "jobflow_execution::poller")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    /// Human-readable message
    pub message: String,
    /// Remaining structured fields
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

/// Forwards job-scoped events; everything else is ignored.
pub struct JobEventLayer {
    sender: mpsc::UnboundedSender<JobEvent>,
}

impl JobEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { sender }
    }

    /// Creates the layer together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl<S> Layer<S> for JobEventLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.sender.is_closed() {
            return;
        }

        let mut fields = HashMap::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        let Some(job_id) = fields.remove("job_id").map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        }) else {
            return;
        };

        let message = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let job_event = JobEvent {
            job_id,
            target: event.metadata().target().to_string(),
            level: event.metadata().level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone: drop the event.
        let _ = self.sender.send(job_event);
    }
}

/// Collects event fields. Job events carry strings, counters and `%`
/// values; any other type falls back to `record_debug`.
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

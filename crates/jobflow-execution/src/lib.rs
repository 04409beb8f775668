//! Execution layer for jobflow: the cancellable status poller, the
//! per-session job runner and tracing setup.

pub mod logging;
pub mod poller;
pub mod runner;
pub mod tracing_layer;

pub use poller::{PollOutcome, PollProgress, StatusPoller};
pub use runner::{Collaborators, JobRunner, JobTicket};
pub use tracing_layer::{JobEvent, JobEventLayer};

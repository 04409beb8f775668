//! Job domain module.
//!
//! # Module Structure
//!
//! - `model`: `Job`, `JobKind`, `JobPayload`, `JobPatch`, `JobFilter`, `Artifact`
//! - `status`: canonical lifecycle (`JobPhase`) and the status mapping
//! - `backend`: collaborator traits for the remote backend and job list

pub mod backend;
mod model;
mod status;

pub use backend::{JobBackend, JobStore, TokenGrant, TokenProvider};
pub use model::{Artifact, Job, JobFilter, JobKind, JobPatch, JobPayload};
pub use status::JobPhase;

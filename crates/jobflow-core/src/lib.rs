//! Domain model and collaborator contracts for client-side orchestration of
//! long-running remote AI generation jobs.

pub mod avatar;
pub mod config;
pub mod credential;
pub mod error;
pub mod job;
pub mod progress;
pub mod usage;
pub mod user;

// Re-export common error type
pub use error::{JobflowError, Result};

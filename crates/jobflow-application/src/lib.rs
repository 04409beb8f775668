//! Application layer for jobflow.
//!
//! This crate provides the components that sit between a caller and the
//! remote job backend: credential caching, quota admission, submission with
//! retry, result fetching and the optimistic job list.

pub mod admission;
pub mod credential_cache;
pub mod materializer;
pub mod reconciler;
pub mod submitter;
pub mod usage_ledger;

pub use admission::{
    Admission, AdmissionController, AutoConfirmOverage, DeclineOverage, OverageConfirmer,
};
pub use credential_cache::CredentialCache;
pub use materializer::ResultMaterializer;
pub use reconciler::{ListReconciler, OverlayEntry, OverlayState};
pub use submitter::{JobSubmitter, SubmitState};
pub use usage_ledger::{InMemoryUsageLedger, OveragePricing};

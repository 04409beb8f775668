//! Heuristic progress and stage inference.
//!
//! - `schedule`: pure elapsed-time → {percent, stage} function
//! - `tracker`: monotonic fold over a polling session's observations

mod schedule;
mod tracker;

pub use schedule::{MAX_ACTIVE_PERCENT, ProgressSchedule, ProgressSnapshot, StageThreshold};
pub use tracker::ProgressTracker;

//! Canonical job lifecycle.
//!
//! The backend reports status with an inconsistent vocabulary. Everything the
//! client reasons about goes through [`JobPhase::from_status`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Local lifecycle a backend status string maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPhase {
    /// Accepted but not yet picked up (`pending`, `submitted`).
    Queued,
    /// Being worked on (`running`, `processing`, and anything unrecognized).
    Active,
    /// Finished successfully (`completed`, `succeeded`).
    Done,
    /// Finished unsuccessfully (`failed`, `failure`).
    Failed,
}

impl JobPhase {
    /// Maps a backend status string onto a phase, case-insensitively.
    ///
    /// Unknown strings map to `Active` so new backend states keep the poller
    /// waiting instead of aborting it.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" | "submitted" => Self::Queued,
            "running" | "processing" => Self::Active,
            "completed" | "succeeded" => Self::Done,
            "failed" | "failure" => Self::Failed,
            _ => Self::Active,
        }
    }

    /// `Done` and `Failed` admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

//! Table-driven mapping from elapsed time to progress and stage.
//!
//! The backend only exposes coarse states, so user-facing progress is a
//! function of wall-clock time against an expected duration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest percentage a non-terminal job may show.
pub const MAX_ACTIVE_PERCENT: f64 = 99.0;

/// A milestone shown to the user once `after_secs` have elapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageThreshold {
    pub after_secs: u64,
    pub label: String,
}

impl StageThreshold {
    pub fn new(after_secs: u64, label: impl Into<String>) -> Self {
        Self {
            after_secs,
            label: label.into(),
        }
    }
}

/// Expected-duration constants and stage table for one job family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSchedule {
    pub expected_duration_secs: u64,
    /// Progress never exceeds this until `Done` is observed.
    pub active_cap_percent: f64,
    /// Stages ordered by `after_secs`.
    pub stages: Vec<StageThreshold>,
}

/// Progress derived for one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub stage_index: usize,
    pub stage_label: Option<String>,
}

impl ProgressSchedule {
    pub fn new(
        expected_duration: Duration,
        active_cap_percent: f64,
        mut stages: Vec<StageThreshold>,
    ) -> Self {
        stages.sort_by_key(|s| s.after_secs);
        Self {
            expected_duration_secs: expected_duration.as_secs().max(1),
            active_cap_percent: active_cap_percent.clamp(0.0, MAX_ACTIVE_PERCENT),
            stages,
        }
    }

    /// Content generation: a few minutes, four stages.
    pub fn content_generation() -> Self {
        Self::new(
            Duration::from_secs(5 * 60),
            90.0,
            vec![
                StageThreshold::new(0, "Preparing"),
                StageThreshold::new(20, "Analyzing sales pages"),
                StageThreshold::new(90, "Generating content"),
                StageThreshold::new(210, "Polishing"),
            ],
        )
    }

    /// Deep research: web search, analysis, synthesis.
    pub fn deep_research() -> Self {
        Self::new(
            Duration::from_secs(12 * 60),
            90.0,
            vec![
                StageThreshold::new(0, "Starting research"),
                StageThreshold::new(30, "Web search"),
                StageThreshold::new(4 * 60, "Analysis"),
                StageThreshold::new(8 * 60, "Synthesis"),
                StageThreshold::new(10 * 60, "Writing report"),
            ],
        )
    }

    /// Avatar extraction: longest running, coarsest stages.
    pub fn avatar_extraction() -> Self {
        Self::new(
            Duration::from_secs(15 * 60),
            85.0,
            vec![
                StageThreshold::new(0, "Fetching sales pages"),
                StageThreshold::new(60, "Identifying personas"),
                StageThreshold::new(6 * 60, "Enriching avatars"),
            ],
        )
    }

    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs(self.expected_duration_secs.max(1))
    }

    fn cap(&self) -> f64 {
        self.active_cap_percent.clamp(0.0, MAX_ACTIVE_PERCENT)
    }

    /// Index of the last stage whose threshold has passed.
    pub fn stage_at(&self, elapsed: Duration) -> usize {
        let secs = elapsed.as_secs();
        self.stages
            .iter()
            .rposition(|s| s.after_secs <= secs)
            .unwrap_or(0)
    }

    pub fn stage_label(&self, index: usize) -> Option<String> {
        self.stages.get(index).map(|s| s.label.clone())
    }

    pub fn last_stage(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// Derives progress for a non-terminal job `elapsed` into its run.
    pub fn derive(&self, elapsed: Duration) -> ProgressSnapshot {
        let ratio = elapsed.as_secs_f64() / self.expected_duration().as_secs_f64();
        let percent = (ratio * 100.0).min(self.cap()).max(0.0);
        let stage_index = self.stage_at(elapsed);
        ProgressSnapshot {
            percent,
            stage_index,
            stage_label: self.stage_label(stage_index),
        }
    }
}

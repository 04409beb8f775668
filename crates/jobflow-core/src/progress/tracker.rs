use std::time::Duration;

use super::schedule::{ProgressSchedule, ProgressSnapshot};
use crate::job::JobPhase;

/// Monotonic progress state of one polling session.
///
/// Percent and stage only move forward. Percent reaches 100 only after
/// `Done` has been observed.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    schedule: ProgressSchedule,
    percent: f64,
    stage_index: usize,
}

impl ProgressTracker {
    pub fn new(schedule: ProgressSchedule) -> Self {
        Self {
            schedule,
            percent: 0.0,
            stage_index: 0,
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn schedule(&self) -> &ProgressSchedule {
        &self.schedule
    }

    /// Folds one observation into the state and returns the new snapshot.
    pub fn observe(&mut self, phase: JobPhase, elapsed: Duration) -> ProgressSnapshot {
        match phase {
            JobPhase::Done => {
                self.percent = 100.0;
                self.stage_index = self.stage_index.max(self.schedule.last_stage());
            }
            JobPhase::Failed => {}
            JobPhase::Queued | JobPhase::Active => {
                let derived = self.schedule.derive(elapsed);
                self.percent = self.percent.max(derived.percent);
                self.stage_index = self.stage_index.max(derived.stage_index);
            }
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent,
            stage_index: self.stage_index,
            stage_label: self.schedule.stage_label(self.stage_index),
        }
    }
}

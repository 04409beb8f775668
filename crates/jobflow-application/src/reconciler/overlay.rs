use jobflow_core::job::{Job, JobFilter, JobPatch};
use std::collections::{HashMap, HashSet};

/// A pending local change layered over the authoritative list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEntry {
    Patch(JobPatch),
    Tombstone,
}

#[derive(Debug, Clone)]
struct PendingPatch {
    patch: JobPatch,
    version: u64,
}

/// Authoritative job list plus pending patches and tombstones.
///
/// Pure and synchronous; [`super::ListReconciler`] drives it.
#[derive(Debug, Default)]
pub struct OverlayState {
    authoritative: Vec<Job>,
    patches: HashMap<String, PendingPatch>,
    tombstones: HashSet<String>,
    next_version: u64,
}

impl OverlayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers `patch` over `job_id`, merged with any pending patch.
    ///
    /// Returns a version that [`clear_patch_if`](Self::clear_patch_if) uses so
    /// an older mutation finishing late does not clear a newer edit.
    pub fn apply_patch(&mut self, job_id: &str, patch: JobPatch) -> u64 {
        self.next_version += 1;
        let version = self.next_version;
        match self.patches.get_mut(job_id) {
            Some(pending) => {
                pending.patch.merge(patch);
                pending.version = version;
            }
            None => {
                self.patches
                    .insert(job_id.to_string(), PendingPatch { patch, version });
            }
        }
        version
    }

    pub fn clear_patch(&mut self, job_id: &str) {
        self.patches.remove(job_id);
    }

    /// Clears the patch only if no newer edit has been layered since `version`.
    pub fn clear_patch_if(&mut self, job_id: &str, version: u64) -> bool {
        if self
            .patches
            .get(job_id)
            .is_some_and(|pending| pending.version == version)
        {
            self.patches.remove(job_id);
            true
        } else {
            false
        }
    }

    pub fn add_tombstone(&mut self, job_id: &str) {
        self.tombstones.insert(job_id.to_string());
    }

    pub fn remove_tombstone(&mut self, job_id: &str) {
        self.tombstones.remove(job_id);
    }

    /// Replaces one authoritative row with a fresher copy from a mutation response.
    pub fn upsert_authoritative(&mut self, job: Job) {
        match self.authoritative.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => self.authoritative.push(job),
        }
    }

    /// Installs a refetched unfiltered list.
    pub fn replace_authoritative(&mut self, jobs: Vec<Job>) {
        self.replace_filtered(jobs, &JobFilter::default());
    }

    /// Installs a list refetched with `filter`.
    ///
    /// Patches already reflected by the new data are cleared. A patch or
    /// tombstone whose row is missing is cleared only when `filter` would have
    /// returned that row; otherwise it waits for a refetch that covers it.
    pub fn replace_filtered(&mut self, jobs: Vec<Job>, filter: &JobFilter) {
        let by_id: HashMap<&str, &Job> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();
        let known: HashMap<&str, &Job> = self
            .authoritative
            .iter()
            .map(|j| (j.id.as_str(), j))
            .collect();

        // Whether the refetch would have listed `id` had it still existed.
        let covers = |id: &str, patch: Option<&JobPatch>| match known.get(id) {
            Some(job) => {
                filter.matches(job)
                    && patch.is_none_or(|patch| {
                        let mut patched = (*job).clone();
                        patch.apply_to(&mut patched);
                        filter.matches(&patched)
                    })
            }
            None => filter.is_unrestricted(),
        };

        self.patches
            .retain(|id, pending| match by_id.get(id.as_str()) {
                Some(job) => !pending.patch.is_reflected_in(job),
                None => !covers(id.as_str(), Some(&pending.patch)),
            });
        self.tombstones
            .retain(|id| by_id.contains_key(id.as_str()) || !covers(id.as_str(), None));

        self.authoritative = jobs;
    }

    /// Authoritative list with tombstoned rows hidden and patches applied.
    pub fn render(&self) -> Vec<Job> {
        self.authoritative
            .iter()
            .filter(|job| !self.tombstones.contains(&job.id))
            .map(|job| {
                let mut job = job.clone();
                if let Some(pending) = self.patches.get(&job.id) {
                    pending.patch.apply_to(&mut job);
                }
                job
            })
            .collect()
    }

    pub fn entry(&self, job_id: &str) -> Option<OverlayEntry> {
        if self.tombstones.contains(job_id) {
            Some(OverlayEntry::Tombstone)
        } else {
            self.patches
                .get(job_id)
                .map(|pending| OverlayEntry::Patch(pending.patch.clone()))
        }
    }

    pub fn authoritative(&self) -> &[Job] {
        &self.authoritative
    }

    /// No pending patch or tombstone.
    pub fn is_clean(&self) -> bool {
        self.patches.is_empty() && self.tombstones.is_empty()
    }
}

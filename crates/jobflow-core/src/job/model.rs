//! Job domain model.
//!
//! A job is a unit of AI-generation work executed by the remote backend and
//! tracked here by id and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::status::JobPhase;
use crate::avatar::{Avatar, ExtractionMode};
use crate::error::{JobflowError, Result};
use crate::usage::UsageType;

/// The job families the backend executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    /// Sales content (pre-lander) generation.
    ContentGeneration,
    /// Persona extraction from sales pages; runs longer, polled less often.
    AvatarExtraction,
    /// Deep research on one selected avatar.
    DeepResearch,
}

impl JobKind {
    /// The quota bucket a submission of this kind consumes, if metered.
    pub fn usage_type(self) -> Option<UsageType> {
        match self {
            Self::ContentGeneration => Some(UsageType::PreLander),
            Self::DeepResearch => Some(UsageType::DeepResearch),
            Self::AvatarExtraction => None,
        }
    }
}

/// A submitted job as reported by the job list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Backend-assigned identifier.
    pub id: String,
    /// Raw backend status string; see [`Job::phase`].
    pub status: String,
    /// The only field editable after creation.
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub kind: JobKind,
    #[serde(default, rename = "salesPageUrls", alias = "sales_page_urls")]
    pub sales_page_urls: Vec<String>,
    #[serde(default)]
    pub brand_info: Option<String>,
    #[serde(default)]
    pub avatars: Vec<Avatar>,
}

impl Job {
    pub fn phase(&self) -> JobPhase {
        JobPhase::from_status(&self.status)
    }
}

/// Body of a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub kind: JobKind,
    pub title: String,
    #[serde(default, rename = "salesPageUrls")]
    pub sales_page_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_info: Option<String>,
    /// Avatars supplied up front, or the single avatar selected for research.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub avatars: Vec<Avatar>,
    /// Job whose avatars an extraction or research job works on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_mode: Option<ExtractionMode>,
}

impl JobPayload {
    /// Creates a content generation payload.
    pub fn content_generation(title: impl Into<String>, sales_page_urls: Vec<String>) -> Self {
        Self {
            kind: JobKind::ContentGeneration,
            title: title.into(),
            sales_page_urls,
            brand_info: None,
            avatars: Vec::new(),
            parent_job_id: None,
            extraction_mode: None,
        }
    }

    /// Creates an avatar extraction payload for an existing job.
    pub fn avatar_extraction(
        parent_job_id: impl Into<String>,
        title: impl Into<String>,
        sales_page_urls: Vec<String>,
        mode: ExtractionMode,
    ) -> Self {
        Self {
            kind: JobKind::AvatarExtraction,
            title: title.into(),
            sales_page_urls,
            brand_info: None,
            avatars: Vec::new(),
            parent_job_id: Some(parent_job_id.into()),
            extraction_mode: Some(mode),
        }
    }

    /// Creates a deep research payload for one selected avatar.
    pub fn deep_research(
        parent_job_id: impl Into<String>,
        title: impl Into<String>,
        avatar: Avatar,
    ) -> Self {
        Self {
            kind: JobKind::DeepResearch,
            title: title.into(),
            sales_page_urls: Vec::new(),
            brand_info: None,
            avatars: vec![avatar],
            parent_job_id: Some(parent_job_id.into()),
            extraction_mode: None,
        }
    }

    pub fn with_brand_info(mut self, brand_info: impl Into<String>) -> Self {
        self.brand_info = Some(brand_info.into());
        self
    }

    pub fn with_avatars(mut self, avatars: Vec<Avatar>) -> Self {
        self.avatars = avatars;
        self
    }

    /// Checks the payload before anything is sent.
    ///
    /// Failures are admission errors and never consume retry attempts.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(JobflowError::validation("job title must not be empty"));
        }

        match self.kind {
            JobKind::ContentGeneration | JobKind::AvatarExtraction => {
                if self.sales_page_urls.iter().all(|url| url.trim().is_empty()) {
                    return Err(JobflowError::validation(
                        "at least one sales page URL is required",
                    ));
                }
                if let Some(url) = self
                    .sales_page_urls
                    .iter()
                    .find(|url| !url.starts_with("http://") && !url.starts_with("https://"))
                {
                    return Err(JobflowError::validation(format!(
                        "sales page URL must be http(s): {url}"
                    )));
                }
            }
            JobKind::DeepResearch => {
                if self.parent_job_id.is_none() {
                    return Err(JobflowError::validation(
                        "deep research requires a parent job",
                    ));
                }
                if self.avatars.len() != 1 {
                    return Err(JobflowError::validation(
                        "deep research requires exactly one selected avatar",
                    ));
                }
            }
        }

        if self.kind == JobKind::AvatarExtraction && self.extraction_mode.is_none() {
            return Err(JobflowError::validation(
                "avatar extraction requires an extraction mode",
            ));
        }

        Ok(())
    }
}

/// Partial update applied to a job. Only the title is editable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl JobPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
    }

    /// Shallow-overrides the job's fields with the patched ones.
    pub fn apply_to(&self, job: &mut Job) {
        if let Some(title) = &self.title {
            job.title = title.clone();
        }
    }

    /// Later patches win field by field.
    pub fn merge(&mut self, newer: JobPatch) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
    }

    /// True when every patched field already holds the patched value.
    pub fn is_reflected_in(&self, job: &Job) -> bool {
        self.title.as_ref().is_none_or(|title| &job.title == title)
    }
}

/// Query for the job list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<JobPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
}

impl JobFilter {
    /// True when the filter returns every job.
    pub fn is_unrestricted(&self) -> bool {
        self.kind.is_none() && self.phase.is_none() && self.title_contains.is_none()
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.kind.is_none_or(|kind| job.kind == kind)
            && self.phase.is_none_or(|phase| job.phase() == phase)
            && self.title_contains.as_ref().is_none_or(|needle| {
                job.title.to_lowercase().contains(&needle.to_lowercase())
            })
    }
}

/// Final output of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub job_id: String,
    pub kind: JobKind,
    /// Backend-owned document; opaque except for extraction results.
    pub content: serde_json::Value,
}

impl Artifact {
    /// Decodes the avatars produced by an extraction job.
    ///
    /// Accepts either `{"avatars": [...]}` or a bare array.
    pub fn avatars(&self) -> Result<Vec<Avatar>> {
        let value = match &self.content {
            serde_json::Value::Object(map) => map
                .get("avatars")
                .cloned()
                .ok_or_else(|| JobflowError::not_found("avatars", self.job_id.clone()))?,
            other => other.clone(),
        };
        Ok(serde_json::from_value(value)?)
    }
}

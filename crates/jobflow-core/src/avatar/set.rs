//! Avatar set of a single job.
//!
//! Research selection is monotonic: once an avatar is marked researched it
//! stays researched and its fields are frozen. After the first selection the
//! set no longer grows; unselected members may still be edited and selected.

use serde::{Deserialize, Serialize};

use super::model::{Avatar, AvatarPatch, ExtractionMode};
use crate::error::{JobflowError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvatarSet {
    avatars: Vec<Avatar>,
}

impl AvatarSet {
    pub fn new(avatars: Vec<Avatar>) -> Self {
        Self { avatars }
    }

    /// Builds the set from an extraction result.
    ///
    /// Exploratory extraction must yield exactly one broad avatar; focused
    /// extraction must yield none.
    pub fn from_extraction(mode: ExtractionMode, avatars: Vec<Avatar>) -> Result<Self> {
        let broad = avatars.iter().filter(|a| a.is_broad_avatar).count();
        match mode {
            ExtractionMode::Exploratory if broad != 1 => Err(JobflowError::validation(format!(
                "exploratory extraction must produce exactly one broad avatar, got {broad}"
            ))),
            ExtractionMode::Focused if broad != 0 => Err(JobflowError::validation(
                "focused extraction must not produce a broad avatar",
            )),
            _ => Ok(Self { avatars }),
        }
    }

    pub fn as_slice(&self) -> &[Avatar] {
        &self.avatars
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    pub fn into_inner(self) -> Vec<Avatar> {
        self.avatars
    }

    /// True once any member was selected for research.
    pub fn research_started(&self) -> bool {
        self.avatars.iter().any(|a| a.is_researched)
    }

    pub fn researched(&self) -> impl Iterator<Item = &Avatar> {
        self.avatars.iter().filter(|a| a.is_researched)
    }

    pub fn add(&mut self, avatar: Avatar) -> Result<()> {
        if self.research_started() {
            return Err(JobflowError::validation(
                "avatars cannot be added after research has started",
            ));
        }
        if avatar.is_broad_avatar && self.avatars.iter().any(|a| a.is_broad_avatar) {
            return Err(JobflowError::validation("job already has a broad avatar"));
        }
        self.avatars.push(Avatar {
            is_researched: false,
            ..avatar
        });
        Ok(())
    }

    pub fn edit(&mut self, index: usize, patch: AvatarPatch) -> Result<&Avatar> {
        let avatar = self
            .avatars
            .get_mut(index)
            .ok_or_else(|| JobflowError::not_found("avatar", index.to_string()))?;
        if avatar.is_researched {
            return Err(JobflowError::validation(format!(
                "avatar '{}' is frozen after research selection",
                avatar.persona_name
            )));
        }
        patch.apply_to(avatar);
        Ok(avatar)
    }

    /// Marks the avatar as selected for research and returns a copy for the
    /// research payload. Selecting an already researched avatar is a no-op.
    pub fn mark_researched(&mut self, index: usize) -> Result<Avatar> {
        let avatar = self
            .avatars
            .get_mut(index)
            .ok_or_else(|| JobflowError::not_found("avatar", index.to_string()))?;
        avatar.is_researched = true;
        Ok(avatar.clone())
    }
}

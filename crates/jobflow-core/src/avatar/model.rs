use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How an extraction job explores personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionMode {
    /// Several specific personas plus one synthesized broad persona.
    Exploratory,
    /// Specific personas only.
    Focused,
}

/// A candidate customer persona attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub persona_name: String,
    pub description: String,
    #[serde(default)]
    pub age_range: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub key_buying_motivation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pain_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desire: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characteristics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_alternatives: Vec<String>,
    #[serde(default)]
    pub is_broad_avatar: bool,
    /// Set when the avatar is selected for deep research; never cleared.
    #[serde(default)]
    pub is_researched: bool,
}

impl Avatar {
    pub fn new(persona_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            persona_name: persona_name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn broad(persona_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            is_broad_avatar: true,
            ..Self::new(persona_name, description)
        }
    }
}

/// Editable avatar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPatch {
    pub persona_name: Option<String>,
    pub description: Option<String>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub key_buying_motivation: Option<String>,
}

impl AvatarPatch {
    pub(crate) fn apply_to(self, avatar: &mut Avatar) {
        if let Some(value) = self.persona_name {
            avatar.persona_name = value;
        }
        if let Some(value) = self.description {
            avatar.description = value;
        }
        if let Some(value) = self.age_range {
            avatar.age_range = value;
        }
        if let Some(value) = self.gender {
            avatar.gender = value;
        }
        if let Some(value) = self.key_buying_motivation {
            avatar.key_buying_motivation = value;
        }
    }
}

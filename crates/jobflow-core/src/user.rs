//! Caller identity as seen by admission control.

use serde::{Deserialize, Serialize};

/// The signed-in user and the organization their quota belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub organization_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
        }
    }
}

//! Avatar (customer persona) domain module.

mod model;
mod set;

pub use model::{Avatar, AvatarPatch, ExtractionMode};
pub use set::AvatarSet;

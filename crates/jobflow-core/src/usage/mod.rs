//! Usage quota domain module.

mod model;
pub mod service;

pub use model::{OverageQuote, UsageCheck, UsageRecord, UsageType, week_start};
pub use service::UsageService;

pub mod classifier;
pub mod registry;
pub mod rule_store;
pub mod session;
pub mod treatment;

pub use crate::domain::model::{NodeId, TailoringEntry, TailoringRule, TreatmentKind};
pub use crate::domain::ports::{ChangeCallback, KeyValueStore, Page, RuleStore};
pub use crate::utils::error::Result;

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TailorConfig;

pub use adapters::{local_store::LocalStore, memory_page::MemoryPage, memory_store::MemoryStore};
pub use self::core::{
    registry::{EngineRegistry, SearchEngineConfig},
    rule_store::SyncedRuleStore,
    session::{CycleReport, SessionState, TailoringSession},
    treatment::TreatmentStyles,
};
pub use domain::model::{NodeId, TailoringEntry, TailoringRule, TreatmentKind};
pub use utils::error::{Result, TailorError};

use crate::domain::model::{TailoringEntry, TailoringRule, TreatmentKind};
use crate::domain::ports::{ChangeCallback, KeyValueStore, RuleStore};
use crate::utils::error::{Result, TailorError};
use crate::utils::subscription::Subscription;
use async_trait::async_trait;
use rand::Rng;

/// Field of the store record holding the ordered entry list.
pub const ENTRIES_KEY: &str = "tailoringEntries";

pub fn default_entries() -> Vec<TailoringEntry> {
    vec![
        TailoringEntry {
            id: "default-1".to_string(),
            domain: "developer.mozilla.org".to_string(),
            treatment: TreatmentKind::Spotlight,
        },
        TailoringEntry {
            id: "default-2".to_string(),
            domain: "w3schools.com".to_string(),
            treatment: TreatmentKind::Suppress,
        },
        TailoringEntry {
            id: "default-3".to_string(),
            domain: "pinterest.com".to_string(),
            treatment: TreatmentKind::Screen,
        },
    ]
}

/// `<unix millis>-<random below max_random>`.
pub fn generate_entry_id(max_random: u32) -> String {
    let random = rand::thread_rng().gen_range(0..max_random.max(1));
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), random)
}

/// Rule store over a key-value record, falling back to defaults when nothing
/// (or an empty list) is persisted.
pub struct SyncedRuleStore<K: KeyValueStore> {
    backend: K,
    defaults: Vec<TailoringEntry>,
    default_treatment: TreatmentKind,
}

impl<K: KeyValueStore> SyncedRuleStore<K> {
    pub fn new(backend: K) -> Self {
        Self {
            backend,
            defaults: default_entries(),
            default_treatment: TreatmentKind::Spotlight,
        }
    }

    pub fn with_defaults(mut self, defaults: Vec<TailoringEntry>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_default_treatment(mut self, treatment: TreatmentKind) -> Self {
        self.default_treatment = treatment;
        self
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    /// Entries in priority order, defaults included when nothing is stored.
    pub async fn entries(&self) -> Result<Vec<TailoringEntry>> {
        let stored = self
            .backend
            .get(ENTRIES_KEY)
            .await
            .map_err(|e| TailorError::store_read(e.to_string()))?;

        let entries: Vec<TailoringEntry> = match stored {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| TailorError::store_read(format!("malformed entries: {}", e)))?,
            None => Vec::new(),
        };

        if entries.is_empty() {
            tracing::debug!("No stored entries, using {} defaults", self.defaults.len());
            return Ok(self.defaults.clone());
        }

        Ok(entries)
    }

    /// Persists `entries` in the given order, replacing what was stored.
    pub async fn save_entries(&self, entries: &[TailoringEntry]) -> Result<()> {
        let value = serde_json::to_value(entries)?;
        self.backend
            .set(ENTRIES_KEY, value)
            .await
            .map_err(|e| TailorError::store_write(e.to_string()))?;
        tracing::debug!("Saved {} tailoring entries", entries.len());
        Ok(())
    }

    /// Appends a new entry with a fresh id and persists the full list.
    pub async fn add_entry(
        &self,
        domain: &str,
        treatment: Option<TreatmentKind>,
    ) -> Result<TailoringEntry> {
        crate::utils::validation::validate_non_empty_string("domain", domain)?;
        if domain.contains(char::is_whitespace) {
            return Err(TailorError::InvalidConfigValueError {
                field: "domain".to_string(),
                value: domain.to_string(),
                reason: "Domains cannot contain whitespace".to_string(),
            });
        }

        let mut entries = self.entries().await?;
        let entry = TailoringEntry {
            id: generate_entry_id(100_000),
            domain: domain.to_string(),
            treatment: treatment.unwrap_or(self.default_treatment),
        };
        entries.push(entry.clone());
        self.save_entries(&entries).await?;
        Ok(entry)
    }

    /// Removes the entry with `id`. Returns `false` if there was none.
    pub async fn remove_entry(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);

        if entries.len() == before {
            return Ok(false);
        }

        self.save_entries(&entries).await?;
        Ok(true)
    }
}

#[async_trait]
impl<K: KeyValueStore> RuleStore for SyncedRuleStore<K> {
    async fn get_rules(&self) -> Result<Vec<TailoringRule>> {
        let entries = self.entries().await?;
        let rules = entries
            .iter()
            .filter(|entry| {
                if entry.domain.is_empty() {
                    tracing::warn!("Ignoring entry {} with an empty domain", entry.id);
                    false
                } else {
                    true
                }
            })
            .map(TailoringEntry::rule)
            .collect();
        Ok(rules)
    }

    fn on_change(&self, callback: ChangeCallback) -> Subscription {
        self.backend.subscribe(callback)
    }
}

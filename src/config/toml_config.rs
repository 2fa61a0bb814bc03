use crate::core::registry::{builtin_definitions, EngineDefinition, EngineRegistry};
use crate::core::rule_store::{default_entries, SyncedRuleStore};
use crate::core::treatment::TreatmentStyles;
use crate::domain::model::{TailoringEntry, TreatmentKind};
use crate::domain::ports::KeyValueStore;
use crate::utils::error::{Result, TailorError};
use crate::utils::validation::{validate_non_empty_string, validate_path, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailorConfig {
    pub engines: Option<Vec<EngineDefinition>>,
    pub treatments: Option<TreatmentStyles>,
    pub defaults: Option<DefaultsConfig>,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Used when the store holds no entries.
    pub entries: Option<Vec<TailoringEntry>>,
    /// Assigned to entries created without an explicit treatment.
    pub treatment: Option<TreatmentKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

impl TailorConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(&path).map_err(|e| TailorError::ConfigError {
                message: format!("cannot read {}: {}", path.as_ref().display(), e),
            })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| TailorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Expands `${VAR}` references; undefined variables are left as written.
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR
            .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(engines) = &self.engines {
            if engines.is_empty() {
                return Err(TailorError::InvalidConfigValueError {
                    field: "engines".to_string(),
                    value: "[]".to_string(),
                    reason: "At least one engine is required when the table is given".to_string(),
                });
            }
            for engine in engines {
                engine.validate()?;
            }
        }

        if let Some(treatments) = &self.treatments {
            treatments.validate()?;
        }

        if let Some(entries) = self.defaults.as_ref().and_then(|d| d.entries.as_ref()) {
            for entry in entries {
                validate_non_empty_string("defaults.entries.domain", &entry.domain)?;
            }
        }

        if let Some(store) = &self.store {
            validate_path("store.path", &store.path)?;
        }

        Ok(())
    }

    /// Engine table from config, or the built-in one.
    pub fn registry(&self) -> Result<EngineRegistry> {
        match &self.engines {
            Some(engines) => EngineRegistry::from_definitions(engines),
            None => EngineRegistry::from_definitions(&builtin_definitions()),
        }
    }

    pub fn styles(&self) -> TreatmentStyles {
        self.treatments.clone().unwrap_or_default()
    }

    pub fn default_entries(&self) -> Vec<TailoringEntry> {
        self.defaults
            .as_ref()
            .and_then(|d| d.entries.clone())
            .unwrap_or_else(default_entries)
    }

    pub fn default_treatment(&self) -> TreatmentKind {
        self.defaults
            .as_ref()
            .and_then(|d| d.treatment)
            .unwrap_or(TreatmentKind::Spotlight)
    }

    pub fn store_path(&self) -> Option<&str> {
        self.store.as_ref().map(|s| s.path.as_str())
    }

    /// Rule store over `backend` carrying this config's defaults.
    pub fn rule_store<K: KeyValueStore>(&self, backend: K) -> SyncedRuleStore<K> {
        SyncedRuleStore::new(backend)
            .with_defaults(self.default_entries())
            .with_default_treatment(self.default_treatment())
    }
}

impl Validate for TailorConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r##"
[[engines]]
name = "startpage"
match_pattern = '^https://(www\.)?startpage\.com/'
result_container = ".w-gl"
result = ".w-gl__result"
result_link = "a.w-gl__result-url"
observe_mutations = true

[treatments.spotlight]
background_color = "#00ff0020"
border_color = "#00ff00ff"

[defaults]
treatment = "suppress"

[[defaults.entries]]
id = "d-1"
domain = "docs.rs"
treatment = "spotlight"

[store]
path = "./tailoring.json"
"##;

        let config = TailorConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("https://www.startpage.com/do/search").is_some());

        let styles = config.styles();
        assert_eq!(styles.spotlight.background_color, "#00ff0020");
        assert_eq!(styles.screen, TreatmentStyles::default().screen);

        assert_eq!(config.default_treatment(), TreatmentKind::Suppress);
        assert_eq!(config.default_entries()[0].domain, "docs.rs");
        assert_eq!(config.store_path(), Some("./tailoring.json"));
    }

    #[test]
    fn test_empty_config_uses_builtins() {
        let config = TailorConfig::from_toml_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry().unwrap().len(), builtin_definitions().len());
        assert_eq!(config.default_entries(), default_entries());
        assert_eq!(config.default_treatment(), TreatmentKind::Spotlight);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TAILOR_TEST_STORE_PATH", "/tmp/tailor-store.json");

        let config = TailorConfig::from_toml_str(
            r#"
[store]
path = "${TAILOR_TEST_STORE_PATH}"
"#,
        )
        .unwrap();
        assert_eq!(config.store_path(), Some("/tmp/tailor-store.json"));

        std::env::remove_var("TAILOR_TEST_STORE_PATH");
    }

    #[test]
    fn test_invalid_colors_and_patterns_fail_validation() {
        let bad_color = TailorConfig::from_toml_str(
            r##"
[treatments.screen]
background_color = "red"
border_color = "#ff0000ff"
"##,
        )
        .unwrap();
        assert!(bad_color.validate().is_err());

        let bad_pattern = TailorConfig::from_toml_str(
            r##"
[[engines]]
name = "broken"
match_pattern = "(unclosed"
result_container = "#c"
result = ".r"
result_link = "a"
"##,
        )
        .unwrap();
        assert!(bad_pattern.validate().is_err());
    }

    #[test]
    fn test_unreadable_config_file_is_config_error() {
        let err = TailorConfig::from_file("/nonexistent/search-tailor.toml").unwrap_err();
        assert!(matches!(err, TailorError::ConfigError { .. }));
        assert!(err.to_string().contains("/nonexistent/search-tailor.toml"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[defaults]\ntreatment = \"screen\"\n")
            .unwrap();

        let config = TailorConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.default_treatment(), TreatmentKind::Screen);
    }
}

use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_regex, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Declarative description of a supported search engine, as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDefinition {
    pub name: String,
    /// Regex tested against the full page URL.
    pub match_pattern: String,
    pub result_container: String,
    pub result: String,
    pub result_link: String,
    /// Set for engines that load results after the initial page render.
    #[serde(default)]
    pub observe_mutations: bool,
}

impl Validate for EngineDefinition {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("engines.name", &self.name)?;
        validate_regex("engines.match_pattern", &self.match_pattern)?;
        validate_non_empty_string("engines.result_container", &self.result_container)?;
        validate_non_empty_string("engines.result", &self.result)?;
        validate_non_empty_string("engines.result_link", &self.result_link)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSelectors {
    pub result_container: String,
    pub result: String,
    pub result_link: String,
}

/// Resolved, immutable engine configuration.
#[derive(Debug, Clone)]
pub struct SearchEngineConfig {
    pub name: String,
    pub match_pattern: Regex,
    pub selectors: EngineSelectors,
    pub observe_mutations: bool,
}

impl SearchEngineConfig {
    pub fn from_definition(definition: &EngineDefinition) -> Result<Self> {
        definition.validate()?;
        let match_pattern = validate_regex("engines.match_pattern", &definition.match_pattern)?;

        Ok(Self {
            name: definition.name.clone(),
            match_pattern,
            selectors: EngineSelectors {
                result_container: definition.result_container.clone(),
                result: definition.result.clone(),
                result_link: definition.result_link.clone(),
            },
            observe_mutations: definition.observe_mutations,
        })
    }

    pub fn matches(&self, page_url: &str) -> bool {
        self.match_pattern.is_match(page_url)
    }
}

/// Ordered table of engine configurations.
///
/// Lookup is first-match in registration order. Well-formed tables do not have
/// overlapping patterns; when they do, the engine registered first wins.
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    engines: Vec<SearchEngineConfig>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(definitions: &[EngineDefinition]) -> Result<Self> {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(SearchEngineConfig::from_definition(definition)?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, engine: SearchEngineConfig) {
        if let Some(existing) = self
            .engines
            .iter()
            .find(|e| e.match_pattern.as_str() == engine.match_pattern.as_str())
        {
            tracing::warn!(
                "Engine '{}' has the same match pattern as '{}' and will never be selected",
                engine.name,
                existing.name
            );
        }
        self.engines.push(engine);
    }

    pub fn resolve(&self, page_url: &str) -> Option<&SearchEngineConfig> {
        self.engines.iter().find(|engine| engine.matches(page_url))
    }

    /// Every engine whose pattern matches, in precedence order.
    pub fn candidates(&self, page_url: &str) -> Vec<&SearchEngineConfig> {
        self.engines
            .iter()
            .filter(|engine| engine.matches(page_url))
            .collect()
    }

    pub fn engines(&self) -> &[SearchEngineConfig] {
        &self.engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

pub fn builtin_definitions() -> Vec<EngineDefinition> {
    vec![
        EngineDefinition {
            name: "google".to_string(),
            match_pattern: r"^https?://(www\.)?google\.[a-z.]+/search".to_string(),
            result_container: "#search".to_string(),
            result: ".g".to_string(),
            result_link: "a".to_string(),
            observe_mutations: false,
        },
        EngineDefinition {
            name: "bing".to_string(),
            match_pattern: r"^https?://(www\.)?bing\.com/search".to_string(),
            result_container: "#b_results".to_string(),
            result: ".b_algo".to_string(),
            result_link: "h2 a".to_string(),
            observe_mutations: false,
        },
        EngineDefinition {
            name: "duckduckgo".to_string(),
            match_pattern: r"^https?://(www\.)?duckduckgo\.com/\?".to_string(),
            result_container: "#links".to_string(),
            result: ".result".to_string(),
            result_link: ".result__a".to_string(),
            observe_mutations: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, pattern: &str) -> EngineDefinition {
        EngineDefinition {
            name: name.to_string(),
            match_pattern: pattern.to_string(),
            result_container: "#results".to_string(),
            result: ".result".to_string(),
            result_link: "a".to_string(),
            observe_mutations: false,
        }
    }

    #[test]
    fn test_builtin_table_resolves_known_engines() {
        let registry = EngineRegistry::from_definitions(&builtin_definitions()).unwrap();
        assert_eq!(registry.len(), 3);

        let google = registry
            .resolve("https://www.google.com/search?q=rust")
            .unwrap();
        assert_eq!(google.name, "google");
        assert!(!google.observe_mutations);

        let ddg = registry.resolve("https://duckduckgo.com/?q=rust").unwrap();
        assert_eq!(ddg.name, "duckduckgo");
        assert!(ddg.observe_mutations);

        assert!(registry.resolve("https://example.com/search?q=rust").is_none());
    }

    #[test]
    fn test_first_registered_engine_wins_on_overlap() {
        let registry = EngineRegistry::from_definitions(&[
            definition("broad", r"^https://search\.example\.com/"),
            definition("narrow", r"^https://search\.example\.com/web"),
        ])
        .unwrap();

        let url = "https://search.example.com/web?q=1";
        assert_eq!(registry.resolve(url).unwrap().name, "broad");

        let names: Vec<&str> = registry
            .candidates(url)
            .into_iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["broad", "narrow"]);
    }

    #[test]
    fn test_invalid_definition_is_rejected() {
        let mut bad = definition("bad", "(unclosed");
        assert!(EngineRegistry::from_definitions(&[bad.clone()]).is_err());

        bad.match_pattern = r"^https://ok\.example/".to_string();
        bad.result_link = String::new();
        assert!(EngineRegistry::from_definitions(&[bad]).is_err());
    }
}

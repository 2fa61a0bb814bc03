//! Matching of search results against tailoring rules.
//!
//! A rule for `domain` matches any link whose text matches
//! `.*://.*\.?<domain>.*`, with the domain escaped literally. That is a
//! substring test after the scheme separator, not a host-boundary test:
//! `foo.com` also matches `https://notfoo.com/`. Matching is case-sensitive
//! and the first matching rule decides the treatment.

use crate::domain::model::{NodeId, TailoringRule, TreatmentKind};
use crate::domain::ports::Page;
use regex::Regex;

pub fn domain_pattern(domain: &str) -> String {
    format!(r".*://.*\.?{}.*", regex::escape(domain))
}

/// Rules compiled once per cycle, kept in priority order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    patterns: Vec<(Regex, TreatmentKind)>,
}

impl RuleSet {
    pub fn compile(rules: &[TailoringRule]) -> Self {
        let mut patterns = Vec::with_capacity(rules.len());

        for rule in rules {
            if rule.domain.is_empty() {
                tracing::warn!("Skipping {} rule with an empty domain", rule.treatment);
                continue;
            }

            match Regex::new(&domain_pattern(&rule.domain)) {
                Ok(regex) => patterns.push((regex, rule.treatment)),
                Err(e) => {
                    tracing::warn!("Skipping rule for '{}': {}", rule.domain, e);
                }
            }
        }

        Self { patterns }
    }

    pub fn match_link(&self, link: &str) -> Option<TreatmentKind> {
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(link))
            .map(|(_, treatment)| *treatment)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Treatment for `result`, or `None` if no rule matches or it has no link node.
pub fn classify<P: Page + ?Sized>(
    page: &P,
    result: NodeId,
    link_selector: &str,
    rules: &RuleSet,
) -> Option<TreatmentKind> {
    let Some(link) = page.query_selector(Some(result), link_selector) else {
        tracing::trace!("Result {:?} has no '{}' link node", result, link_selector);
        return None;
    };

    let text = page.link_text(link)?;
    rules.match_link(&text)
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visual treatment applied to a matching search result.
///
/// At most one treatment marker is present on a result after a completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentKind {
    Spotlight,
    Suppress,
    Screen,
}

impl TreatmentKind {
    pub const ALL: [TreatmentKind; 3] = [
        TreatmentKind::Spotlight,
        TreatmentKind::Suppress,
        TreatmentKind::Screen,
    ];

    /// The class-list marker carried by a treated result.
    pub fn marker(self) -> &'static str {
        match self {
            TreatmentKind::Spotlight => "spotlight",
            TreatmentKind::Suppress => "suppress",
            TreatmentKind::Screen => "screen",
        }
    }

    /// Selector group matching any treated node, e.g. `.spotlight, .suppress, .screen`.
    pub fn any_marker_selector() -> String {
        Self::ALL
            .iter()
            .map(|kind| format!(".{}", kind.marker()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for TreatmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

impl FromStr for TreatmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "spotlight" => Ok(TreatmentKind::Spotlight),
            "suppress" => Ok(TreatmentKind::Suppress),
            "screen" => Ok(TreatmentKind::Screen),
            other => Err(format!(
                "unknown treatment '{}', expected spotlight, suppress or screen",
                other
            )),
        }
    }
}

/// A domain pattern paired with the treatment for results that match it.
///
/// The domain is compared case-sensitively against raw link text; it is not
/// normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailoringRule {
    pub domain: String,
    pub treatment: TreatmentKind,
}

impl TailoringRule {
    pub fn new(domain: impl Into<String>, treatment: TreatmentKind) -> Self {
        Self {
            domain: domain.into(),
            treatment,
        }
    }
}

/// Persisted shape of a rule, as written under the store's entries key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailoringEntry {
    pub id: String,
    pub domain: String,
    pub treatment: TreatmentKind,
}

impl TailoringEntry {
    pub fn rule(&self) -> TailoringRule {
        TailoringRule::new(self.domain.clone(), self.treatment)
    }
}

/// Opaque handle to a node of an externally managed page.
///
/// Handles are only meaningful within the cycle that queried them; the page may
/// destroy the node at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

use crate::domain::model::{NodeId, TreatmentKind};
use crate::domain::ports::Page;
use crate::utils::error::Result;
use crate::utils::validation::{validate_hex_color, Validate};
use serde::{Deserialize, Serialize};

/// Removes every treatment marker from `node`. Safe on unmarked nodes.
pub fn reset<P: Page + ?Sized>(page: &P, node: NodeId) {
    for kind in TreatmentKind::ALL {
        page.remove_marker(node, kind);
    }
}

/// Adds the marker for `treatment`. Callers reset the node first in the same
/// cycle; this does not clear other markers.
pub fn apply<P: Page + ?Sized>(page: &P, node: NodeId, treatment: TreatmentKind) {
    page.add_marker(node, treatment);
}

/// Markers currently present on `node`.
pub fn markers<P: Page + ?Sized>(page: &P, node: NodeId) -> Vec<TreatmentKind> {
    TreatmentKind::ALL
        .into_iter()
        .filter(|kind| page.has_marker(node, *kind))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentStyle {
    pub background_color: String,
    pub border_color: String,
}

impl TreatmentStyle {
    fn new(background_color: &str, border_color: &str) -> Self {
        Self {
            background_color: background_color.to_string(),
            border_color: border_color.to_string(),
        }
    }
}

/// Colors for each treatment. Values are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreatmentStyles {
    pub spotlight: TreatmentStyle,
    pub suppress: TreatmentStyle,
    pub screen: TreatmentStyle,
}

impl Default for TreatmentStyles {
    fn default() -> Self {
        Self {
            spotlight: TreatmentStyle::new("#fff3bf80", "#fab005ff"),
            suppress: TreatmentStyle::new("#f1f3f580", "#adb5bdff"),
            screen: TreatmentStyle::new("#ffe3e380", "#fa5252ff"),
        }
    }
}

impl TreatmentStyles {
    pub fn style(&self, kind: TreatmentKind) -> &TreatmentStyle {
        match kind {
            TreatmentKind::Spotlight => &self.spotlight,
            TreatmentKind::Suppress => &self.suppress,
            TreatmentKind::Screen => &self.screen,
        }
    }

    /// CSS rules keyed by marker class, one per treatment.
    pub fn stylesheet(&self) -> String {
        TreatmentKind::ALL
            .iter()
            .map(|kind| {
                let style = self.style(*kind);
                format!(
                    ".{} {{\n    background-color: {};\n    border-color: {};\n}}\n",
                    kind.marker(),
                    style.background_color,
                    style.border_color
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Validate for TreatmentStyles {
    fn validate(&self) -> Result<()> {
        for kind in TreatmentKind::ALL {
            let style = self.style(kind);
            validate_hex_color(
                &format!("treatments.{}.background_color", kind),
                &style.background_color,
            )?;
            validate_hex_color(
                &format!("treatments.{}.border_color", kind),
                &style.border_color,
            )?;
        }
        Ok(())
    }
}

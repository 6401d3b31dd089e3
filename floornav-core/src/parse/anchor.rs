use crate::error::{Diagnostic, DiagnosticCode, ParseError};
use serde::Deserialize;
use std::collections::BTreeMap;

fn default_anchor_kind() -> String {
    "ANCHOR".to_string()
}

/// A localisation device at a fixed world position.
///
/// Only `(x, y)` is used downstream; `z` and `yaw` are carried through for
/// completeness.
#[derive(Debug, Clone, Deserialize)]
pub struct Anchor {
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default = "default_anchor_kind", rename = "type")]
    pub kind: String,
    pub position: AnchorPosition,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchorPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub sl_uid: String,
}

/// Parses the anchor table from JSON bytes into a name → anchor mapping.
///
/// Keys are case-sensitive. When two records share a name, the later one
/// replaces the earlier with a warning. Elements missing a name or a
/// usable position are skipped with a warning rather than failing the
/// batch.
///
/// # Errors
///
/// Fails only when the body is not JSON or carries no anchor array.
pub fn parse_anchors(
    bytes: &[u8],
) -> Result<(BTreeMap<String, Anchor>, Vec<Diagnostic>), ParseError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let elements = super::record_array(value, "anchors")?;

    let mut anchors = BTreeMap::new();
    let mut diagnostics = Vec::new();
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<Anchor>(element) {
            Ok(anchor) if anchor.name.is_empty() => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::InvalidInput,
                    format!("Anchor record {index} has an empty name; skipped"),
                ));
            }
            Ok(anchor) => {
                if anchors.insert(anchor.name.clone(), anchor.clone()).is_some() {
                    diagnostics.push(Diagnostic::with_subject(
                        DiagnosticCode::InvalidInput,
                        "Duplicate anchor name; the later record replaces the earlier",
                        anchor.name,
                    ));
                }
            }
            Err(err) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::InvalidInput,
                    format!("Anchor record {index} skipped: {err}"),
                ));
            }
        }
    }
    Ok((anchors, diagnostics))
}

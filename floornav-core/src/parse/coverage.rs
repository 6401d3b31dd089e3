use crate::error::{Diagnostic, DiagnosticCode, ParseError};
use geo::{Coord, coord};
use serde::{Deserialize, Deserializer, Serialize};

/// Whether a coverage polygon describes a 1-D strip or a 2-D area.
///
/// Only 2-D, non-exclusion polygons participate in travel-lane generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverageKind {
    OneD,
    #[default]
    TwoD,
}

impl CoverageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            CoverageKind::OneD => "1D",
            CoverageKind::TwoD => "2D",
        }
    }
}

impl<'de> Deserialize<'de> for CoverageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "1d" => Ok(CoverageKind::OneD),
            "2d" => Ok(CoverageKind::TwoD),
            _ => Err(serde::de::Error::custom(format!(
                "coverage kind must be 1D or 2D, got {raw:?}"
            ))),
        }
    }
}

/// A millimetre-frame vertex as it appears in record files.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MmPoint {
    pub x: f64,
    pub y: f64,
}

impl From<MmPoint> for Coord {
    fn from(p: MmPoint) -> Coord {
        coord! { x: p.x, y: p.y }
    }
}

impl From<Coord> for MmPoint {
    fn from(c: Coord) -> MmPoint {
        MmPoint { x: c.x, y: c.y }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageGeometry {
    #[serde(default)]
    pub shape: String,
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub threshold: f64,
    pub points: Vec<MmPoint>,
}

/// An authored region in the millimetre frame where the position service
/// is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct CoveragePolygon {
    pub uid: String,
    #[serde(default)]
    pub kind: CoverageKind,
    #[serde(default)]
    pub exclusion: bool,
    pub geometry: CoverageGeometry,
    #[serde(default)]
    pub sublocation_uid: String,
}

impl CoveragePolygon {
    /// The polygon ring in millimetre coordinates.
    pub fn mm_vertices(&self) -> Vec<Coord> {
        self.geometry.points.iter().map(|p| Coord::from(*p)).collect()
    }
}

/// Parses the coverage polygon set from JSON bytes, preserving input order.
///
/// Elements without a uid or with fewer than three points are skipped with
/// a warning.
///
/// # Errors
///
/// Fails only when the body is not JSON or carries no coverage array.
pub fn parse_coverage(
    bytes: &[u8],
) -> Result<(Vec<CoveragePolygon>, Vec<Diagnostic>), ParseError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let elements = super::record_array(value, "coverages")?;

    let mut polygons = Vec::new();
    let mut diagnostics = Vec::new();
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<CoveragePolygon>(element) {
            Ok(polygon) if polygon.uid.is_empty() => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::InvalidInput,
                    format!("Coverage record {index} has an empty uid; skipped"),
                ));
            }
            Ok(polygon) if polygon.geometry.points.len() < 3 => {
                diagnostics.push(Diagnostic::with_subject(
                    DiagnosticCode::InvalidInput,
                    format!(
                        "Coverage polygon has {} points; at least 3 required",
                        polygon.geometry.points.len()
                    ),
                    polygon.uid,
                ));
            }
            Ok(polygon) => polygons.push(polygon),
            Err(err) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::InvalidInput,
                    format!("Coverage record {index} skipped: {err}"),
                ));
            }
        }
    }
    Ok((polygons, diagnostics))
}

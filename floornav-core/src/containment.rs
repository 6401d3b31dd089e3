//! # Obstacle containment
//!
//! Obstacle outlines come from an external provider per coverage polygon
//! and frequently leak past the coverage edge. This module constrains
//! them to lie inside their parent while preserving their shape: outside
//! vertices are pulled along the line toward an interior anchor point
//! rather than snapped to the boundary, which keeps the outline's
//! footprint useful for routing-width decisions.

use crate::error::{Diagnostic, DiagnosticCode};
use crate::parse::CoveragePolygon;
use crate::pipeline::CancelToken;
use crate::spatial::{PixelBounds, point_in_polygon, polygon_centroid, vertex_mean};
use crate::zone::{Zone, props};
use crate::{Provenance, ZoneVariant};
use geo::Coord;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

const BINARY_SEARCH_ITERATIONS: usize = 20;
/// After the search, step this fraction of the remaining distance toward
/// the anchor to keep off the boundary.
const NUDGE_FRACTION: f64 = 0.1;
const ADVANCE_FRACTION: f64 = 0.2;
const MAX_ADVANCES: usize = 10;

/// Why the provider flagged a region as non-travelable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleReason {
    Racking,
    Conveyor,
    Equipment,
    Obstacle,
    Other,
}

impl ObstacleReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObstacleReason::Racking => "racking",
            ObstacleReason::Conveyor => "conveyor",
            ObstacleReason::Equipment => "equipment",
            ObstacleReason::Obstacle => "obstacle",
            ObstacleReason::Other => "other",
        }
    }
}

/// A pixel vertex as the provider emits it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OutlinePoint {
    pub x: f64,
    pub y: f64,
}

/// One obstacle outline in the parent coverage's cropped pixel frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ObstacleOutline {
    pub name: String,
    pub reason: ObstacleReason,
    pub vertices: Vec<OutlinePoint>,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Obstacle provider was cancelled")]
    Cancelled,
    #[error("Obstacle provider failed: {0}")]
    Failed(String),
}

/// The external obstacle source, modelled as a synchronous call with an
/// explicit cancellation token.
pub trait ObstacleProvider {
    /// Yields the outlines for one coverage polygon, in the coverage's
    /// cropped pixel frame.
    ///
    /// # Errors
    ///
    /// Implementations surface cancellation and transport failures here;
    /// per-outline geometry problems are left to the containment engine.
    fn provide(
        &self,
        coverage: &CoveragePolygon,
        crop: &PixelBounds,
        cancel: &CancelToken,
    ) -> Result<Vec<ObstacleOutline>, ProviderError>;
}

/// A provider backed by pre-fetched outlines, keyed by coverage uid.
#[derive(Debug, Default)]
pub struct StaticObstacleProvider {
    outlines: BTreeMap<String, Vec<ObstacleOutline>>,
}

impl StaticObstacleProvider {
    pub fn new(outlines: BTreeMap<String, Vec<ObstacleOutline>>) -> Self {
        StaticObstacleProvider { outlines }
    }
}

impl ObstacleProvider for StaticObstacleProvider {
    fn provide(
        &self,
        coverage: &CoveragePolygon,
        _crop: &PixelBounds,
        cancel: &CancelToken,
    ) -> Result<Vec<ObstacleOutline>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(self.outlines.get(&coverage.uid).cloned().unwrap_or_default())
    }
}

/// Which interior point outside vertices are pulled toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainmentAnchor {
    /// Centroid of the outline's own inside vertices. Preserves the
    /// outline's shape best.
    #[default]
    InsideVertexCentroid,
    /// Centroid of the parent coverage polygon.
    CoverageCentroid,
}

/// Outcome of constraining one outline against its parent coverage.
#[derive(Debug, Clone, PartialEq)]
pub enum Containment {
    /// Every vertex was already inside; accepted unchanged.
    Inside,
    /// Outside vertices were pulled in. `fully_contained` is false when
    /// some vertex still escapes after all repair steps.
    Adjusted {
        vertices: Vec<Coord>,
        fully_contained: bool,
    },
    /// Entirely outside the parent; dropped.
    Outside,
}

/// Translates an outline out of its cropped frame, clamps it to the image
/// rectangle, and rejects outlines with fewer than three vertices.
pub fn normalize_outline(
    outline: &ObstacleOutline,
    crop_origin: Coord,
    image_width: u32,
    image_height: u32,
) -> Option<Vec<Coord>> {
    if outline.vertices.len() < 3 {
        return None;
    }
    Some(
        outline
            .vertices
            .iter()
            .map(|p| {
                geo::coord! {
                    x: (p.x + crop_origin.x).clamp(0.0, f64::from(image_width)),
                    y: (p.y + crop_origin.y).clamp(0.0, f64::from(image_height)),
                }
            })
            .collect(),
    )
}

/// Constrains one pixel ring to lie inside the coverage ring.
pub fn constrain_to_coverage(
    ring: &[Coord],
    coverage: &[Coord],
    anchor: ContainmentAnchor,
) -> Containment {
    let inside_flags: Vec<bool> = ring
        .iter()
        .map(|v| point_in_polygon(*v, coverage))
        .collect();
    if inside_flags.iter().all(|f| *f) {
        return Containment::Inside;
    }
    if !inside_flags.iter().any(|f| *f) {
        return Containment::Outside;
    }

    let inside_vertices: Vec<Coord> = ring
        .iter()
        .zip(&inside_flags)
        .filter(|(_, inside)| **inside)
        .map(|(v, _)| *v)
        .collect();
    // The unwraps hold: we just established at least one inside vertex.
    let anchor_point = match anchor {
        ContainmentAnchor::InsideVertexCentroid => vertex_mean(&inside_vertices).unwrap(),
        ContainmentAnchor::CoverageCentroid => polygon_centroid(coverage)
            .unwrap_or_else(|| vertex_mean(&inside_vertices).unwrap()),
    };

    let mut fully_contained = true;
    let adjusted: Vec<Coord> = ring
        .iter()
        .zip(&inside_flags)
        .map(|(v, inside)| {
            if *inside {
                *v
            } else {
                let pulled = pull_inside(*v, anchor_point, coverage);
                if !point_in_polygon(pulled, coverage) {
                    fully_contained = false;
                }
                pulled
            }
        })
        .collect();
    Containment::Adjusted {
        vertices: adjusted,
        fully_contained,
    }
}

fn lerp(from: Coord, to: Coord, t: f64) -> Coord {
    from + (to - from) * t
}

/// Pulls an outside vertex along the segment toward the anchor: binary
/// search for the farthest point still inside, a small inward nudge, then
/// bounded inward advances, falling back to the anchor itself.
fn pull_inside(vertex: Coord, anchor: Coord, coverage: &[Coord]) -> Coord {
    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    for _ in 0..BINARY_SEARCH_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        if point_in_polygon(lerp(vertex, anchor, mid), coverage) {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let mut t = hi + NUDGE_FRACTION * (1.0 - hi);
    let mut candidate = lerp(vertex, anchor, t);
    let mut advances = 0;
    while !point_in_polygon(candidate, coverage) && advances < MAX_ADVANCES {
        t += ADVANCE_FRACTION * (1.0 - t);
        candidate = lerp(vertex, anchor, t);
        advances += 1;
    }
    if point_in_polygon(candidate, coverage) {
        candidate
    } else {
        anchor
    }
}

/// Runs containment over one coverage polygon's outlines and emits the
/// surviving obstacles as `BlockedArea` zones.
pub fn obstacles_for_coverage(
    coverage_uid: &str,
    coverage_ring: &[Coord],
    outlines: &[ObstacleOutline],
    crop_origin: Coord,
    image_width: u32,
    image_height: u32,
    anchor: ContainmentAnchor,
) -> (Vec<Zone>, Vec<Diagnostic>) {
    let mut zones = Vec::new();
    let mut diagnostics = Vec::new();

    for (index, outline) in outlines.iter().enumerate() {
        let Some(ring) = normalize_outline(outline, crop_origin, image_width, image_height)
        else {
            diagnostics.push(Diagnostic::with_subject(
                DiagnosticCode::InvalidInput,
                format!(
                    "Obstacle outline {:?} has {} vertices; at least 3 required",
                    outline.name,
                    outline.vertices.len()
                ),
                coverage_uid,
            ));
            continue;
        };

        let vertices = match constrain_to_coverage(&ring, coverage_ring, anchor) {
            Containment::Inside => ring,
            Containment::Outside => {
                diagnostics.push(Diagnostic::with_subject(
                    DiagnosticCode::ContainmentViolation,
                    format!(
                        "Obstacle outline {:?} lies entirely outside its coverage; dropped",
                        outline.name
                    ),
                    coverage_uid,
                ));
                continue;
            }
            Containment::Adjusted {
                vertices,
                fully_contained,
            } => {
                if !fully_contained {
                    warn!(
                        outline = %outline.name,
                        coverage = coverage_uid,
                        "Obstacle could not be fully repaired into its coverage; emitting anyway"
                    );
                    diagnostics.push(Diagnostic::with_subject(
                        DiagnosticCode::ContainmentViolation,
                        format!(
                            "Obstacle outline {:?} kept vertices outside its coverage after repair",
                            outline.name
                        ),
                        coverage_uid,
                    ));
                }
                vertices
            }
        };

        let name = if outline.name.is_empty() {
            format!("Blocked area {index}")
        } else {
            outline.name.clone()
        };
        zones.push(
            Zone::new(
                format!("blocked-{coverage_uid}-{index}"),
                name,
                ZoneVariant::BlockedArea,
                vertices,
                Provenance::Ai,
            )
            .with_confidence(outline.confidence)
            .with_property(props::PARENT_COVERAGE_ID, coverage_uid)
            .with_property(props::BLOCKED_REASON, outline.reason.as_str()),
        );
    }

    (zones, diagnostics)
}

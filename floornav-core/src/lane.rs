//! # Travel-lane generation
//!
//! Lifts 2-D coverage polygons into travelable zones and, as a separate
//! post-pass, stretches aisle corridor endpoints until they reach a
//! travel-lane boundary so the graph builder can see the two as adjacent.

use crate::calibrate::PixelTransformer;
use crate::corridor::aisle_centreline;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::parse::{CoverageKind, CoveragePolygon};
use crate::spatial::{EPSILON, distinct_vertex_count, first_ray_polygon_hit, magnitude};
use crate::zone::{Zone, props};
use crate::{Provenance, ZoneVariant};
use geo::Coord;

/// Tuning for the aisle-extension post-pass.
#[derive(Debug, Clone)]
pub struct AisleExtension {
    /// Fixed overhang past the travel-lane boundary, in pixels.
    pub overhang_px: f64,
    /// Upper bound on how far an endpoint may be extended, in pixels.
    pub max_extension_px: f64,
}

impl Default for AisleExtension {
    fn default() -> Self {
        AisleExtension {
            overhang_px: 5.0,
            max_extension_px: 500.0,
        }
    }
}

/// Generates travel-lane zones from the coverage set, in input order.
///
/// Only 2-D, non-exclusion polygons become travel lanes. Exclusion
/// polygons are optionally emitted as `Restricted` zones; 1-D polygons
/// are filtered out entirely.
pub fn generate_travel_lanes(
    coverage: &[CoveragePolygon],
    transformer: &PixelTransformer,
    emit_restricted: bool,
) -> (Vec<Zone>, Vec<Diagnostic>) {
    let mut zones = Vec::new();
    let mut diagnostics = Vec::new();

    for polygon in coverage {
        if polygon.kind == CoverageKind::OneD {
            continue;
        }
        let vertices = transformer.polygon_to_pixels(&polygon.mm_vertices());
        if distinct_vertex_count(&vertices) < 3 {
            diagnostics.push(Diagnostic::with_subject(
                DiagnosticCode::DegenerateGeometry,
                "Coverage polygon collapsed below three distinct pixel vertices; dropped",
                polygon.uid.clone(),
            ));
            continue;
        }

        if polygon.exclusion {
            if emit_restricted {
                zones.push(coverage_zone(polygon, vertices, ZoneVariant::Restricted));
            }
            continue;
        }
        zones.push(coverage_zone(polygon, vertices, ZoneVariant::TravelLane));
    }

    (zones, diagnostics)
}

fn coverage_zone(polygon: &CoveragePolygon, vertices: Vec<Coord>, variant: ZoneVariant) -> Zone {
    let prefix = match variant {
        ZoneVariant::Restricted => "restricted",
        _ => "lane",
    };
    Zone::new(
        format!("{prefix}-{}", polygon.uid),
        format!("{} {}", variant.display_name(), polygon.uid),
        variant,
        vertices,
        Provenance::Coverage,
    )
    .with_property(props::COVERAGE_UID, &polygon.uid)
    .with_property(props::COVERAGE_TYPE, polygon.kind.as_str())
    .with_property(props::MARGIN_MM, polygon.geometry.margin.to_string())
    .with_property(props::THRESHOLD_MM, polygon.geometry.threshold.to_string())
}

/// Extends four-vertex aisle quads until their centreline meets a
/// travel-lane boundary, plus a small overhang.
///
/// Endpoints with no boundary hit within the configured bound are left
/// alone, as are chained (more-than-four-vertex) corridors.
pub fn extend_aisles(aisles: &mut [Zone], lanes: &[Zone], config: &AisleExtension) {
    let lane_rings: Vec<&[Coord]> = lanes
        .iter()
        .filter(|z| z.variant == ZoneVariant::TravelLane)
        .map(|z| z.vertices.as_slice())
        .collect();
    if lane_rings.is_empty() {
        return;
    }

    for aisle in aisles.iter_mut() {
        if aisle.vertices.len() != 4 {
            continue;
        }
        let Some(centreline) = aisle_centreline(&aisle.vertices) else {
            continue;
        };
        let direction = centreline[1] - centreline[0];
        if magnitude(direction) < EPSILON {
            continue;
        }
        let unit = direction / magnitude(direction);

        let end_delta = extension_distance(centreline[1], unit, &lane_rings, config);
        let start_delta = extension_distance(centreline[0], -unit, &lane_rings, config);
        if end_delta == 0.0 && start_delta == 0.0 {
            continue;
        }

        // Ring order is [start-left, end-left, end-right, start-right].
        let mut vertices = aisle.vertices.clone();
        vertices[1] = vertices[1] + unit * end_delta;
        vertices[2] = vertices[2] + unit * end_delta;
        vertices[0] = vertices[0] - unit * start_delta;
        vertices[3] = vertices[3] - unit * start_delta;
        aisle.replace_vertices(vertices);
    }
}

/// How far to push one endpoint: distance to the nearest lane boundary
/// plus the overhang, or zero when nothing is hit within the bound.
fn extension_distance(
    origin: Coord,
    direction: Coord,
    lane_rings: &[&[Coord]],
    config: &AisleExtension,
) -> f64 {
    let nearest = lane_rings
        .iter()
        .filter_map(|ring| first_ray_polygon_hit(origin, direction, ring))
        .map(|(_, dist)| dist)
        .min_by(f64::total_cmp);
    match nearest {
        Some(dist) if dist <= config.max_extension_px => dist + config.overhang_px,
        _ => 0.0,
    }
}

//! # The batch pipeline
//!
//! One synchronous pass from validated inputs to a routable graph. All
//! collaborators are explicit parameters and all results are returned, so
//! the pipeline is a deterministic function of its inputs: parsers and
//! generators preserve input order and ids are assigned in emission order.

use crate::calibrate::{CalibrationRecord, PixelTransformer, ScaleValidation};
use crate::containment::{
    ContainmentAnchor, ObstacleOutline, ObstacleProvider, ProviderError, StaticObstacleProvider,
    obstacles_for_coverage,
};
use crate::corridor::generate_aisle_zones;
use crate::error::{Diagnostic, DiagnosticCode, PipelineError};
use crate::lane::{AisleExtension, extend_aisles, generate_travel_lanes};
use crate::navgraph::{GraphConfig, NavGraph, build_navigation_graph};
use crate::parse::{Anchor, AnchorPair, CoverageKind, CoveragePolygon};
use crate::spatial::Aabb;
use crate::zone::Zone;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Cooperative cancellation for long pipeline stages.
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything the pipeline consumes.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub calibration: CalibrationRecord,
    pub anchors: BTreeMap<String, Anchor>,
    pub pairs: Vec<AnchorPair>,
    pub coverage: Vec<CoveragePolygon>,
    /// Pre-fetched obstacle outlines, keyed by coverage uid.
    pub obstacles: BTreeMap<String, Vec<ObstacleOutline>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub graph: GraphConfig,
    /// `None` disables the aisle-extension post-pass.
    pub aisle_extension: Option<AisleExtension>,
    pub containment_anchor: ContainmentAnchor,
    /// Emit exclusion coverage as `Restricted` zones.
    pub emit_restricted_zones: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            graph: GraphConfig::default(),
            aisle_extension: Some(AisleExtension::default()),
            containment_anchor: ContainmentAnchor::default(),
            emit_restricted_zones: true,
        }
    }
}

/// Everything the pipeline produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub transformer: PixelTransformer,
    pub scale: ScaleValidation,
    /// Aisle, travel-lane and restricted zones, in emission order (aisles
    /// in schedule order first, then coverage zones in input order).
    pub zones: Vec<Zone>,
    /// Constrained obstacle zones.
    pub obstacles: Vec<Zone>,
    pub graph: NavGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the whole pipeline.
///
/// # Errors
///
/// Whole-input failures only: an unusable calibration record, or
/// cancellation. Per-record problems surface as diagnostics on the
/// output.
pub fn run_pipeline(
    input: &PipelineInput,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<PipelineOutput, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let mut diagnostics = Vec::new();

    let (transformer, scale) = PixelTransformer::validated(&input.calibration, &input.anchors)?;
    if !scale.valid {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::ScaleAnomaly,
            scale.message.clone(),
        ));
    }

    let (mut aisles, aisle_diags) =
        generate_aisle_zones(&input.pairs, &input.anchors, &transformer);
    diagnostics.extend(aisle_diags);
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let (lanes, lane_diags) =
        generate_travel_lanes(&input.coverage, &transformer, config.emit_restricted_zones);
    diagnostics.extend(lane_diags);

    if let Some(extension) = &config.aisle_extension {
        extend_aisles(&mut aisles, &lanes, extension);
    }

    let provider = StaticObstacleProvider::new(input.obstacles.clone());
    let mut obstacles = Vec::new();
    for coverage in input
        .coverage
        .iter()
        .filter(|c| c.kind == CoverageKind::TwoD && !c.exclusion)
    {
        let ring = transformer.polygon_to_pixels(&coverage.mm_vertices());
        let Some(bounds) = Aabb::from_vertices(&ring) else {
            continue;
        };
        let crop = bounds.to_pixel_bounds();
        let outlines = match provider.provide(coverage, &crop, cancel) {
            Ok(outlines) => outlines,
            Err(ProviderError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(ProviderError::Failed(message)) => {
                diagnostics.push(Diagnostic::with_subject(
                    DiagnosticCode::InvalidInput,
                    format!("Obstacle provider failed: {message}"),
                    coverage.uid.clone(),
                ));
                continue;
            }
        };
        if outlines.is_empty() {
            continue;
        }
        let (zones, containment_diags) = obstacles_for_coverage(
            &coverage.uid,
            &ring,
            &outlines,
            crop.origin(),
            transformer.image_width(),
            transformer.image_height(),
            config.containment_anchor,
        );
        obstacles.extend(zones);
        diagnostics.extend(containment_diags);
    }
    debug!(
        aisles = aisles.len(),
        lanes = lanes.len(),
        obstacles = obstacles.len(),
        "zone generation complete"
    );

    let mut zones = aisles;
    zones.extend(lanes);

    let graph = build_navigation_graph(&zones, &obstacles, &config.graph, cancel)?;
    info!(
        zones = zones.len(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        diagnostics = diagnostics.len(),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        transformer,
        scale,
        zones,
        obstacles,
        graph,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containment::{ObstacleReason, OutlinePoint};
    use crate::parse::{
        AnchorPosition, CoverageGeometry, MmPoint, PairDimension,
    };
    use crate::route::find_path;
    use crate::spatial::point_in_polygon;
    use crate::{Provenance, ZoneVariant};
    use geo::coord;

    fn calibration() -> CalibrationRecord {
        // mm per pixel = 1; world y flips across the 1000 px image height.
        CalibrationRecord {
            filename: "site.png".to_string(),
            width: 2000,
            height: 1000,
            centre_px_x: 1000.0,
            centre_px_y: 500.0,
            raw_scale: 0.01,
            rotation: None,
            sublocation_uid: "sl-1".to_string(),
        }
    }

    fn anchor(name: &str, x: f64, y: f64) -> (String, Anchor) {
        (
            name.to_string(),
            Anchor {
                name: name.to_string(),
                uid: String::new(),
                kind: "ANCHOR".to_string(),
                position: AnchorPosition {
                    x,
                    y,
                    z: 0.0,
                    yaw: 0.0,
                    sl_uid: String::new(),
                },
                locked: false,
            },
        )
    }

    fn warehouse_input() -> PipelineInput {
        let coverage = CoveragePolygon {
            uid: "cov-1".to_string(),
            kind: CoverageKind::TwoD,
            exclusion: false,
            geometry: CoverageGeometry {
                shape: "polygon".to_string(),
                margin: 0.0,
                threshold: 0.0,
                points: vec![
                    MmPoint { x: 0.0, y: 0.0 },
                    MmPoint { x: 1000.0, y: 0.0 },
                    MmPoint { x: 1000.0, y: 1000.0 },
                    MmPoint { x: 0.0, y: 1000.0 },
                ],
            },
            sublocation_uid: String::new(),
        };
        let pair = AnchorPair {
            row: 1,
            source: "A".to_string(),
            destination: "B".to_string(),
            slot: "slot-1".to_string(),
            dimension: PairDimension::OneD,
            distance_mm: 500.0,
            boundary: String::new(),
            margin_mm: 200.0,
        };
        let outline = ObstacleOutline {
            name: "rack".to_string(),
            reason: ObstacleReason::Racking,
            vertices: vec![
                OutlinePoint { x: 400.0, y: 400.0 },
                OutlinePoint { x: 600.0, y: 400.0 },
                OutlinePoint { x: 600.0, y: 600.0 },
                OutlinePoint { x: 400.0, y: 600.0 },
            ],
            confidence: 0.9,
        };
        PipelineInput {
            calibration: calibration(),
            anchors: [anchor("A", 1010.0, 500.0), anchor("B", 1510.0, 500.0)].into(),
            pairs: vec![pair],
            coverage: vec![coverage],
            obstacles: [("cov-1".to_string(), vec![outline])].into(),
        }
    }

    #[test]
    fn end_to_end_build_and_route() {
        let input = warehouse_input();
        let output =
            run_pipeline(&input, &PipelineConfig::default(), &CancelToken::new()).unwrap();

        assert!(output.scale.valid);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

        // Aisles in schedule order first, then coverage zones.
        assert_eq!(output.zones[0].id, "aisle-slot-1");
        assert_eq!(output.zones[1].id, "lane-cov-1");
        assert_eq!(output.obstacles.len(), 1);
        assert_eq!(output.obstacles[0].id, "blocked-cov-1-0");

        // The extension pass pulled the aisle's near end into the lane.
        let aisle = &output.zones[0];
        assert!(aisle.vertices.iter().any(|v| v.x < 1000.0));

        // Graph invariants: waypoints clear of the obstacle, edges never
        // crossing it.
        let obstacle_ring = output.obstacles[0].vertices.as_slice();
        for node in &output.graph.nodes {
            assert!(!point_in_polygon(node.position, obstacle_ring));
        }
        assert!(output.graph.is_connected());

        // Route from inside the lane to deep inside the aisle.
        let result = find_path(
            &output.graph,
            &output.zones,
            &output.obstacles,
            coord! { x: 100.0, y: 100.0 },
            coord! { x: 1400.0, y: 500.0 },
        );
        assert!(result.success, "route failed: {:?}", result.reason);
        assert!(result.total_distance > 0.0);
    }

    #[test]
    fn deterministic_given_identical_inputs() {
        let input = warehouse_input();
        let first =
            run_pipeline(&input, &PipelineConfig::default(), &CancelToken::new()).unwrap();
        let second =
            run_pipeline(&input, &PipelineConfig::default(), &CancelToken::new()).unwrap();

        let ids = |output: &PipelineOutput| -> Vec<String> {
            output.zones.iter().map(|z| z.id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.graph.nodes.len(), second.graph.nodes.len());
        assert_eq!(first.graph.edges.len(), second.graph.edges.len());
        for (a, b) in first.graph.edges.iter().zip(&second.graph.edges) {
            assert_eq!((a.from, a.to), (b.from, b.to));
        }
    }

    #[test]
    fn scale_anomaly_is_corrected_and_reported() {
        let mut input = warehouse_input();
        input.obstacles.clear();
        // 0.01 mm/px: the anchor spread lands far outside the image.
        input.calibration.raw_scale = 0.0001;
        input.anchors = [anchor("A", 0.0, 0.0), anchor("B", 40_000.0, 500.0)].into();
        input.pairs.clear();

        let output =
            run_pipeline(&input, &PipelineConfig::default(), &CancelToken::new()).unwrap();
        assert!(!output.scale.valid);
        // 40 m over 2000 px = 20 mm per pixel.
        assert!((output.transformer.mm_per_pixel() - 20.0).abs() < 1e-9);
        assert!(
            output
                .diagnostics
                .iter()
                .any(|d| d.code == DiagnosticCode::ScaleAnomaly)
        );
    }

    #[test]
    fn disabling_extension_leaves_aisles_alone() {
        let input = warehouse_input();
        let config = PipelineConfig {
            aisle_extension: None,
            ..PipelineConfig::default()
        };
        let output = run_pipeline(&input, &config, &CancelToken::new()).unwrap();
        let aisle = &output.zones[0];
        assert!(aisle.vertices.iter().all(|v| v.x >= 1010.0 - 1e-9));
    }

    #[test]
    fn restricted_zones_are_emitted_but_never_routed() {
        let mut input = warehouse_input();
        input.obstacles.clear();
        let mut exclusion = input.coverage[0].clone();
        exclusion.uid = "keep-out".to_string();
        exclusion.exclusion = true;
        exclusion.geometry.points = vec![
            MmPoint { x: 1600.0, y: 0.0 },
            MmPoint { x: 1900.0, y: 0.0 },
            MmPoint { x: 1900.0, y: 300.0 },
            MmPoint { x: 1600.0, y: 300.0 },
        ];
        input.coverage.push(exclusion);

        let output =
            run_pipeline(&input, &PipelineConfig::default(), &CancelToken::new()).unwrap();
        let restricted = output
            .zones
            .iter()
            .find(|z| z.id == "restricted-keep-out")
            .expect("restricted zone must be emitted");
        assert_eq!(restricted.variant, ZoneVariant::Restricted);
        assert_eq!(restricted.provenance, Provenance::Coverage);
        assert!(
            !output
                .graph
                .zone_waypoints
                .contains_key("restricted-keep-out")
        );
    }

    #[test]
    fn cancellation_short_circuits() {
        let token = CancelToken::new();
        token.cancel();
        match run_pipeline(&warehouse_input(), &PipelineConfig::default(), &token) {
            Err(PipelineError::Cancelled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_pair_is_a_diagnostic_not_an_error() {
        let mut input = warehouse_input();
        input.obstacles.clear();
        input.pairs[0].destination = "GHOST".to_string();
        let output =
            run_pipeline(&input, &PipelineConfig::default(), &CancelToken::new()).unwrap();
        assert!(
            output
                .diagnostics
                .iter()
                .any(|d| d.code == DiagnosticCode::UnresolvedReference)
        );
        // The lane still made it through.
        assert!(output.zones.iter().any(|z| z.id == "lane-cov-1"));
    }
}

//! # Aisle corridor generation
//!
//! Turns 1-D anchor pairs into rectangular corridors in the millimetre
//! frame, merges chained pairs (three or more anchors joined end to end)
//! into a single miter-joined polyline corridor, and transforms the result
//! into pixel-frame zones.

use crate::calibrate::PixelTransformer;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::parse::{Anchor, AnchorPair, PairDimension};
use crate::spatial::{EPSILON, distinct_vertex_count, magnitude};
use crate::zone::{Zone, props};
use crate::{Provenance, ZoneVariant};
use geo::{Coord, coord};
use std::collections::{BTreeMap, BTreeSet};

/// Miter lengths are clamped to this multiple of the half-width so sharp
/// chain angles do not spike.
const MITER_LIMIT: f64 = 3.0;

/// A 1-D pair whose anchor names resolved against the anchor table.
struct ResolvedPair<'a> {
    pair: &'a AnchorPair,
    source_mm: Coord,
    dest_mm: Coord,
}

impl ResolvedPair<'_> {
    /// Identifier used in zone ids; falls back to the row number for rows
    /// without a slot.
    fn slot_id(&self) -> String {
        if self.pair.slot.is_empty() {
            self.pair.row.to_string()
        } else {
            self.pair.slot.clone()
        }
    }
}

/// Generates aisle zones from the schedule, in schedule order.
///
/// Pairs that share anchors are merged into chain corridors; a merged zone
/// takes the position of its earliest contributing pair. Unresolved anchor
/// names, zero-length pairs and zero margins skip the pair with a
/// diagnostic.
pub fn generate_aisle_zones(
    pairs: &[AnchorPair],
    anchors: &BTreeMap<String, Anchor>,
    transformer: &PixelTransformer,
) -> (Vec<Zone>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let mut resolved: Vec<ResolvedPair> = Vec::new();
    for pair in pairs.iter().filter(|p| p.dimension == PairDimension::OneD) {
        let Some(source) = anchors.get(&pair.source) else {
            diagnostics.push(Diagnostic::with_subject(
                DiagnosticCode::UnresolvedReference,
                format!("Pair {} references an unknown source anchor", pair.row),
                pair.source.clone(),
            ));
            continue;
        };
        let Some(dest) = anchors.get(&pair.destination) else {
            diagnostics.push(Diagnostic::with_subject(
                DiagnosticCode::UnresolvedReference,
                format!("Pair {} references an unknown destination anchor", pair.row),
                pair.destination.clone(),
            ));
            continue;
        };
        resolved.push(ResolvedPair {
            pair,
            source_mm: coord! { x: source.position.x, y: source.position.y },
            dest_mm: coord! { x: dest.position.x, y: dest.position.y },
        });
    }

    let components = connected_components(&resolved);
    let mut zones = Vec::new();
    let mut emitted = vec![false; components.len()];
    let mut chain_counter = 0usize;

    for (index, rp) in resolved.iter().enumerate() {
        let component_id = components[index];
        let component: Vec<usize> = (0..resolved.len())
            .filter(|i| components[*i] == component_id)
            .collect();

        if let Some(sequence) = chain_sequence(&component, &resolved)
            && sequence.len() >= 3
        {
            if !emitted[component_id] {
                emitted[component_id] = true;
                chain_counter += 1;
                match chain_zone(chain_counter, &sequence, &component, &resolved, transformer) {
                    Ok(zone) => zones.push(zone),
                    Err(diag) => diagnostics.push(diag),
                }
            }
            continue;
        }

        // Two-anchor components, branches and cycles all fall back to one
        // rectangle per pair.
        match single_pair_zone(rp, transformer) {
            Ok(zone) => zones.push(zone),
            Err(diag) => diagnostics.push(diag),
        }
    }

    (zones, diagnostics)
}

/// Assigns each resolved pair to an undirected connected component over
/// shared anchor names. Returns a component id per pair.
fn connected_components(resolved: &[ResolvedPair]) -> Vec<usize> {
    let mut by_anchor: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, rp) in resolved.iter().enumerate() {
        by_anchor.entry(&rp.pair.source).or_default().push(index);
        by_anchor.entry(&rp.pair.destination).or_default().push(index);
    }

    let mut components = vec![usize::MAX; resolved.len()];
    let mut next_component = 0;
    for start in 0..resolved.len() {
        if components[start] != usize::MAX {
            continue;
        }
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            if components[index] != usize::MAX {
                continue;
            }
            components[index] = next_component;
            let rp = &resolved[index];
            for name in [&rp.pair.source, &rp.pair.destination] {
                for neighbour in &by_anchor[name.as_str()] {
                    if components[*neighbour] == usize::MAX {
                        stack.push(*neighbour);
                    }
                }
            }
        }
        next_component += 1;
    }
    components
}

/// Orders a component's anchors into a path, or `None` when the component
/// branches, cycles or degenerates (a self-pair).
fn chain_sequence(component: &[usize], resolved: &[ResolvedPair]) -> Option<Vec<String>> {
    let mut neighbours: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for index in component {
        let rp = &resolved[*index];
        if rp.pair.source == rp.pair.destination {
            return None;
        }
        neighbours
            .entry(&rp.pair.source)
            .or_default()
            .insert(&rp.pair.destination);
        neighbours
            .entry(&rp.pair.destination)
            .or_default()
            .insert(&rp.pair.source);
    }

    let node_count = neighbours.len();
    // A path has exactly one fewer distinct edge than it has nodes, and no
    // node of degree three or more.
    if component.len() != node_count.checked_sub(1)?
        || neighbours.values().any(|n| n.len() > 2)
    {
        return None;
    }

    // Walk from a deterministic endpoint: the first degree-1 anchor named
    // by the earliest contributing pair.
    let first = &resolved[component[0]];
    let start = [first.pair.source.as_str(), first.pair.destination.as_str()]
        .into_iter()
        .find(|name| neighbours[name].len() == 1)
        .or_else(|| {
            neighbours
                .iter()
                .find(|(_, n)| n.len() == 1)
                .map(|(name, _)| *name)
        })?;

    let mut sequence = vec![start.to_string()];
    let mut previous: Option<&str> = None;
    let mut current = start;
    while let Some(next) = neighbours[current]
        .iter()
        .find(|n| Some(**n) != previous)
        .copied()
    {
        sequence.push(next.to_string());
        previous = Some(current);
        current = next;
        if sequence.len() > node_count {
            return None;
        }
    }
    (sequence.len() == node_count).then_some(sequence)
}

/// Perpendicular (left-hand) offset of half-width `half` for a segment
/// heading `theta`.
fn perpendicular(theta: f64, half: f64) -> Coord {
    coord! { x: -theta.sin() * half, y: theta.cos() * half }
}

fn single_pair_zone(
    rp: &ResolvedPair,
    transformer: &PixelTransformer,
) -> Result<Zone, Diagnostic> {
    let pair = rp.pair;
    let v = rp.dest_mm - rp.source_mm;
    let length = magnitude(v);
    if length < EPSILON {
        return Err(Diagnostic::with_subject(
            DiagnosticCode::DegenerateGeometry,
            format!("Pair {} has coincident anchors; no corridor emitted", pair.row),
            rp.slot_id(),
        ));
    }
    if pair.margin_mm <= 0.0 {
        return Err(Diagnostic::with_subject(
            DiagnosticCode::DegenerateGeometry,
            format!("Pair {} has a zero margin; no corridor emitted", pair.row),
            rp.slot_id(),
        ));
    }

    let theta = v.y.atan2(v.x);
    let offset = perpendicular(theta, pair.margin_mm / 2.0);
    let mm_ring = [
        rp.source_mm + offset,
        rp.dest_mm + offset,
        rp.dest_mm - offset,
        rp.source_mm - offset,
    ];
    let vertices = transformer.polygon_to_pixels(&mm_ring);

    let direction = if v.x.abs() >= v.y.abs() {
        "horizontal"
    } else {
        "vertical"
    };
    Ok(Zone::new(
        format!("aisle-{}", rp.slot_id()),
        format!("Aisle {}-{}", pair.source, pair.destination),
        ZoneVariant::AislePath,
        vertices,
        Provenance::Tdoa,
    )
    .with_property(props::TDOA_SLOT, rp.slot_id())
    .with_property(props::SOURCE_ANCHOR, &pair.source)
    .with_property(props::DEST_ANCHOR, &pair.destination)
    .with_property(props::MARGIN_MM, pair.margin_mm.to_string())
    .with_property(props::DISTANCE_MM, pair.distance_mm.to_string())
    .with_property(props::DIRECTION, direction))
}

fn chain_zone(
    chain_number: usize,
    sequence: &[String],
    component: &[usize],
    resolved: &[ResolvedPair],
    transformer: &PixelTransformer,
) -> Result<Zone, Diagnostic> {
    let first = &resolved[component[0]];
    // The chain inherits the earliest pair's margin as its uniform width.
    let half = first.pair.margin_mm / 2.0;
    let chain_label = sequence.join(",");
    if half <= 0.0 {
        return Err(Diagnostic::with_subject(
            DiagnosticCode::DegenerateGeometry,
            "Chain has a zero margin; no corridor emitted",
            chain_label,
        ));
    }

    let mut positions: BTreeMap<&str, Coord> = BTreeMap::new();
    for index in component {
        let rp = &resolved[*index];
        positions.insert(&rp.pair.source, rp.source_mm);
        positions.insert(&rp.pair.destination, rp.dest_mm);
    }
    let points: Vec<Coord> = sequence
        .iter()
        .map(|name| positions[name.as_str()])
        .collect();

    let mut lefts = Vec::with_capacity(points.len());
    let mut rights = Vec::with_capacity(points.len());
    for i in 0..points.len() {
        let offset = if i == 0 {
            let v = points[1] - points[0];
            perpendicular(v.y.atan2(v.x), half)
        } else if i == points.len() - 1 {
            let v = points[i] - points[i - 1];
            perpendicular(v.y.atan2(v.x), half)
        } else {
            let v_in = points[i] - points[i - 1];
            let v_out = points[i + 1] - points[i];
            let theta_in = v_in.y.atan2(v_in.x);
            let theta_out = v_out.y.atan2(v_out.x);
            let bisector = (theta_in + theta_out) / 2.0;
            let half_turn = ((theta_out - theta_in) / 2.0).cos().abs();
            let miter = if half_turn < EPSILON {
                MITER_LIMIT * half
            } else {
                (half / half_turn).min(MITER_LIMIT * half)
            };
            perpendicular(bisector, miter)
        };
        lefts.push(points[i] + offset);
        rights.push(points[i] - offset);
    }

    let mm_ring: Vec<Coord> = lefts.into_iter().chain(rights.into_iter().rev()).collect();
    let vertices = transformer.polygon_to_pixels(&mm_ring);
    if distinct_vertex_count(&vertices) < 3 {
        return Err(Diagnostic::with_subject(
            DiagnosticCode::DegenerateGeometry,
            "Chain corridor collapsed to a degenerate polygon; dropped",
            chain_label,
        ));
    }

    let slots: Vec<String> = component
        .iter()
        .map(|index| resolved[*index].slot_id())
        .collect();
    Ok(Zone::new(
        format!("aisle-chain-{chain_number}"),
        format!("Aisle chain {}", sequence.join("-")),
        ZoneVariant::AislePath,
        vertices,
        Provenance::Tdoa,
    )
    .with_property(props::ANCHOR_SEQUENCE, chain_label)
    .with_property(props::TDOA_SLOT, slots.join(","))
    .with_property(props::MARGIN_MM, first.pair.margin_mm.to_string()))
}

/// Recovers the centreline of a corridor polygon.
///
/// Corridor rings are a left-edge walk followed by the reversed right-edge
/// walk, so the centreline is the pairwise midpoint of opposite vertices.
/// Returns `None` for rings that cannot be a corridor (odd or short).
pub fn aisle_centreline(vertices: &[Coord]) -> Option<Vec<Coord>> {
    let n = vertices.len();
    if n < 4 || n % 2 != 0 {
        return None;
    }
    Some(
        (0..n / 2)
            .map(|i| (vertices[i] + vertices[n - 1 - i]) * 0.5)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::CalibrationRecord;
    use crate::parse::AnchorPosition;
    use crate::spatial::{closest_point_on_boundary, distance, point_in_polygon, polygon_area};

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

    fn pair(row: u32, source: &str, dest: &str, margin: f64) -> AnchorPair {
        AnchorPair {
            row,
            source: source.to_string(),
            destination: dest.to_string(),
            slot: format!("slot-{row}"),
            dimension: PairDimension::OneD,
            distance_mm: 0.0,
            boundary: String::new(),
            margin_mm: margin,
        }
    }

    /// mm == px, no flips; large enough to hold the test geometry.
    fn identity_transformer() -> PixelTransformer {
        let record = CalibrationRecord {
            filename: String::new(),
            width: 40_000,
            height: 40_000,
            centre_px_x: 20_000.0,
            centre_px_y: 20_000.0,
            raw_scale: 0.01,
            rotation: None,
            sublocation_uid: String::new(),
        };
        PixelTransformer::with_flips(&record, false, false).unwrap()
    }

    fn contains_or_touches(point: Coord, polygon: &[Coord]) -> bool {
        point_in_polygon(point, polygon)
            || closest_point_on_boundary(point, polygon).is_some_and(|(_, d)| d < 1e-6)
    }

    #[test]
    fn two_anchor_horizontal_aisle() {
        // mm_per_pixel = 10, image mm range x: 0..20000, y: -1000..1000.
        let record = CalibrationRecord {
            filename: String::new(),
            width: 2000,
            height: 200,
            centre_px_x: 1000.0,
            centre_px_y: 0.0,
            raw_scale: 0.1,
            rotation: None,
            sublocation_uid: String::new(),
        };
        let transformer = PixelTransformer::new(&record).unwrap();
        let anchors: BTreeMap<String, Anchor> =
            [anchor("A", 0.0, 0.0), anchor("B", 10_000.0, 0.0)].into();
        let pairs = vec![pair(1, "A", "B", 1000.0)];

        let (zones, diagnostics) = generate_aisle_zones(&pairs, &anchors, &transformer);
        assert!(diagnostics.is_empty());
        assert_eq!(zones.len(), 1);

        let zone = &zones[0];
        let expected = [
            coord! { x: 0.0, y: 50.0 },
            coord! { x: 1000.0, y: 50.0 },
            coord! { x: 1000.0, y: 150.0 },
            coord! { x: 0.0, y: 150.0 },
        ];
        assert_eq!(zone.vertices.len(), 4);
        for (got, want) in zone.vertices.iter().zip(expected) {
            assert!((got.x - want.x).abs() < 1e-6, "{got:?} vs {want:?}");
            assert!((got.y - want.y).abs() < 1e-6, "{got:?} vs {want:?}");
        }
        assert_eq!(zone.property(props::DIRECTION), Some("horizontal"));
        assert_eq!(zone.property(props::SOURCE_ANCHOR), Some("A"));
        assert_eq!(zone.variant, ZoneVariant::AislePath);
        assert_eq!(zone.provenance, Provenance::Tdoa);
    }

    #[test]
    fn corridor_area_and_axis() {
        let transformer = identity_transformer();
        let anchors: BTreeMap<String, Anchor> =
            [anchor("A", 2000.0, 3000.0), anchor("B", 7000.0, 8000.0)].into();
        let pairs = vec![pair(1, "A", "B", 600.0)];
        let (zones, _) = generate_aisle_zones(&pairs, &anchors, &transformer);
        let zone = &zones[0];

        // Shoelace area equals corridor length times margin.
        let length = distance(
            coord! { x: 2000.0, y: 3000.0 },
            coord! { x: 7000.0, y: 8000.0 },
        );
        assert!((polygon_area(&zone.vertices) - length * 600.0).abs() < 1e-3);

        // The anchors sit on the central axis.
        let centreline = aisle_centreline(&zone.vertices).unwrap();
        assert!(distance(centreline[0], coord! { x: 2000.0, y: 3000.0 }) < 1e-6);
        assert!(distance(centreline[1], coord! { x: 7000.0, y: 8000.0 }) < 1e-6);
    }

    #[test]
    fn l_shaped_chain_miters_at_the_elbow() {
        let transformer = identity_transformer();
        let anchors: BTreeMap<String, Anchor> = [
            anchor("A", 0.0, 0.0),
            anchor("B", 10_000.0, 0.0),
            anchor("C", 10_000.0, 10_000.0),
        ]
        .into();
        let pairs = vec![pair(1, "A", "B", 1000.0), pair(2, "B", "C", 1000.0)];

        let (zones, diagnostics) = generate_aisle_zones(&pairs, &anchors, &transformer);
        assert!(diagnostics.is_empty());
        assert_eq!(zones.len(), 1, "chained pairs must merge into one zone");

        let zone = &zones[0];
        assert_eq!(distinct_vertex_count(&zone.vertices), 6);
        assert_eq!(zone.property(props::ANCHOR_SEQUENCE), Some("A,B,C"));

        for (x, y) in [(0.0, 0.0), (10_000.0, 0.0), (10_000.0, 10_000.0)] {
            assert!(
                contains_or_touches(coord! { x: x, y: y }, &zone.vertices),
                "anchor ({x}, {y}) must be inside or on the chain corridor"
            );
        }

        // Elbow miter: the inner corner pulls back by half / cos(45°).
        let elbow = zone.vertices[1];
        assert!((elbow.x - 9500.0).abs() < 1e-6);
        assert!((elbow.y - 500.0).abs() < 1e-6);
    }

    #[test]
    fn zero_margin_and_self_pairs_yield_no_zone() {
        let transformer = identity_transformer();
        let anchors: BTreeMap<String, Anchor> =
            [anchor("A", 0.0, 0.0), anchor("B", 5000.0, 0.0)].into();

        let (zones, diagnostics) =
            generate_aisle_zones(&[pair(1, "A", "B", 0.0)], &anchors, &transformer);
        assert!(zones.is_empty());
        assert_eq!(diagnostics[0].code, DiagnosticCode::DegenerateGeometry);

        let (zones, diagnostics) =
            generate_aisle_zones(&[pair(1, "A", "A", 1000.0)], &anchors, &transformer);
        assert!(zones.is_empty());
        assert_eq!(diagnostics[0].code, DiagnosticCode::DegenerateGeometry);
    }

    #[test]
    fn unresolved_anchor_skips_pair() {
        let transformer = identity_transformer();
        let anchors: BTreeMap<String, Anchor> = [anchor("A", 0.0, 0.0)].into();
        let (zones, diagnostics) =
            generate_aisle_zones(&[pair(1, "A", "GHOST", 1000.0)], &anchors, &transformer);
        assert!(zones.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnresolvedReference);
        assert_eq!(diagnostics[0].subject.as_deref(), Some("GHOST"));
    }

    #[test]
    fn branching_component_falls_back_to_rectangles() {
        let transformer = identity_transformer();
        let anchors: BTreeMap<String, Anchor> = [
            anchor("HUB", 0.0, 0.0),
            anchor("N", 0.0, 5000.0),
            anchor("E", 5000.0, 0.0),
            anchor("S", 0.0, -5000.0),
        ]
        .into();
        let pairs = vec![
            pair(1, "HUB", "N", 800.0),
            pair(2, "HUB", "E", 800.0),
            pair(3, "HUB", "S", 800.0),
        ];
        let (zones, diagnostics) = generate_aisle_zones(&pairs, &anchors, &transformer);
        assert!(diagnostics.is_empty());
        assert_eq!(zones.len(), 3);
        assert!(zones.iter().all(|z| z.vertices.len() == 4));
    }

    #[test]
    fn two_d_pairs_are_ignored() {
        let transformer = identity_transformer();
        let anchors: BTreeMap<String, Anchor> =
            [anchor("A", 0.0, 0.0), anchor("B", 5000.0, 0.0)].into();
        let mut informational = pair(1, "A", "B", 1000.0);
        informational.dimension = PairDimension::TwoD;
        let (zones, diagnostics) =
            generate_aisle_zones(&[informational], &anchors, &transformer);
        assert!(zones.is_empty());
        assert!(diagnostics.is_empty());
    }
}

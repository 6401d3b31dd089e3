//! # Navigation graph builder
//!
//! Samples waypoints inside travelable zones (along aisle centrelines,
//! over a grid for 2-D areas), connects them with intra- and inter-zone
//! edges, and rejects any edge whose segment crosses an obstacle boundary.
//!
//! The graph is two parallel arrays (nodes and edges) with integer node
//! handles; the edge list is stored in both directions and sorted by
//! `(from, to)` so path ties resolve reproducibly.

use crate::calibrate::PixelTransformer;
use crate::corridor::aisle_centreline;
use crate::error::PipelineError;
use crate::pipeline::CancelToken;
use crate::spatial::{
    Aabb, distance, point_in_polygon, polygon_centroid, polygons_overlap,
    segment_intersection, segment_to_segment_distance,
};
use crate::zone::Zone;
use crate::{Provenance, ZoneVariant};
use geo::Coord;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Grid pitch for 2-D areas, as a fraction of the max step.
const GRID_PITCH_FACTOR: f64 = 0.8;
/// Intra-area edges connect waypoints within this multiple of the max step.
const AREA_EDGE_FACTOR: f64 = 1.5;
/// Inter-zone connections must be within this multiple of the adjacency
/// tolerance.
const CONNECTION_REACH_FACTOR: f64 = 3.0;

/// Waypoint sampling and adjacency thresholds, in pixels.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Longest distance between consecutive waypoints (~4 m at common
    /// warehouse scales).
    pub max_step_px: f64,
    /// How close zone boundaries must be to count as adjacent.
    pub adjacency_tolerance_px: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            max_step_px: 150.0,
            adjacency_tolerance_px: 50.0,
        }
    }
}

impl GraphConfig {
    /// Expresses both thresholds in millimetres, converted through the
    /// calibration transformer.
    pub fn from_millimetres(
        transformer: &PixelTransformer,
        step_mm: f64,
        tolerance_mm: f64,
    ) -> Self {
        GraphConfig {
            max_step_px: step_mm / transformer.mm_per_pixel(),
            adjacency_tolerance_px: tolerance_mm / transformer.mm_per_pixel(),
        }
    }
}

/// Whether a node belongs to a 1-D aisle or a 2-D area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneClass {
    Aisle,
    Area,
}

impl ZoneClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            ZoneClass::Aisle => "aisle",
            ZoneClass::Area => "area",
        }
    }
}

/// Position of a waypoint along its aisle centreline.
///
/// Inter-zone connections may only originate from `Start` or `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AislePosition {
    Start,
    Mid,
    End,
}

impl AislePosition {
    pub const fn as_str(self) -> &'static str {
        match self {
            AislePosition::Start => "start",
            AislePosition::Mid => "mid",
            AislePosition::End => "end",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavNode {
    pub id: u32,
    pub position: Coord,
    pub zone_id: String,
    pub zone_class: ZoneClass,
    /// Monotonic index of this waypoint within its zone.
    pub waypoint_index: u32,
    pub aisle_position: Option<AislePosition>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavEdge {
    pub from: u32,
    pub to: u32,
    /// Euclidean pixel distance.
    pub weight: f64,
}

/// The assembled graph. Immutable once built; queries may share it freely.
#[derive(Debug, Clone, Default)]
pub struct NavGraph {
    pub nodes: Vec<NavNode>,
    /// Both directions of every connection, sorted by `(from, to)`.
    pub edges: Vec<NavEdge>,
    pub zone_waypoints: BTreeMap<String, Vec<u32>>,
    pub aisle_zones: BTreeSet<String>,
    edge_offsets: Vec<usize>,
}

impl NavGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Outgoing edges of a node, via the CSR offsets built at finalise.
    pub fn neighbours(&self, node: u32) -> &[NavEdge] {
        let index = node as usize;
        &self.edges[self.edge_offsets[index]..self.edge_offsets[index + 1]]
    }

    /// Nodes with no edges at all.
    pub fn isolated_nodes(&self) -> Vec<u32> {
        self.nodes
            .iter()
            .filter(|n| self.neighbours(n.id).is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Whole-graph connectivity by DFS from the first node. Empty graphs
    /// count as connected.
    pub fn is_connected(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![0u32];
        let mut seen = 0usize;
        while let Some(node) = stack.pop() {
            let index = node as usize;
            if visited[index] {
                continue;
            }
            visited[index] = true;
            seen += 1;
            for edge in self.neighbours(node) {
                if !visited[edge.to as usize] {
                    stack.push(edge.to);
                }
            }
        }
        seen == self.nodes.len()
    }

    fn finalise(&mut self) {
        self.edges.sort_by_key(|e| (e.from, e.to));
        self.edges.dedup_by_key(|e| (e.from, e.to));
        let mut offsets = vec![0usize; self.nodes.len() + 1];
        for edge in &self.edges {
            offsets[edge.from as usize + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }
        self.edge_offsets = offsets;
    }
}

/// A travelable zone admitted to graph building.
struct TravelZone<'a> {
    zone: &'a Zone,
    class: ZoneClass,
    bounds: Aabb,
}

/// Builds the navigation graph over the travelable zones.
///
/// Classification: a zone is a 1-D aisle iff provenance is `Tdoa` with
/// variant `AislePath`, and a 2-D area iff provenance is `Coverage` with
/// variant `TravelLane`. Everything else is excluded up front.
///
/// # Errors
///
/// Only cancellation aborts the build.
pub fn build_navigation_graph(
    zones: &[Zone],
    obstacles: &[Zone],
    config: &GraphConfig,
    cancel: &CancelToken,
) -> Result<NavGraph, PipelineError> {
    let obstacle_rings: Vec<&[Coord]> =
        obstacles.iter().map(|z| z.vertices.as_slice()).collect();

    let travel_zones: Vec<TravelZone> = zones
        .iter()
        .filter(|z| z.is_travelable())
        .filter_map(|zone| {
            let class = match (zone.provenance, zone.variant) {
                (Provenance::Tdoa, ZoneVariant::AislePath) => ZoneClass::Aisle,
                (Provenance::Coverage, ZoneVariant::TravelLane) => ZoneClass::Area,
                _ => return None,
            };
            let bounds = zone.bounds()?;
            Some(TravelZone { zone, class, bounds })
        })
        .collect();

    let mut graph = NavGraph::default();

    // Waypoints, zone by zone, in input order.
    for travel_zone in &travel_zones {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let positions = match travel_zone.class {
            ZoneClass::Aisle => sample_aisle(travel_zone, config, &obstacle_rings),
            ZoneClass::Area => sample_area(travel_zone, config, &obstacle_rings),
        };
        let zone_id = travel_zone.zone.id.clone();
        let mut ids = Vec::with_capacity(positions.len());
        let last = positions.len().saturating_sub(1);
        for (index, position) in positions.into_iter().enumerate() {
            let aisle_position = (travel_zone.class == ZoneClass::Aisle).then(|| {
                if index == 0 {
                    AislePosition::Start
                } else if index == last {
                    AislePosition::End
                } else {
                    AislePosition::Mid
                }
            });
            let id = u32::try_from(graph.nodes.len()).unwrap_or(u32::MAX);
            graph.nodes.push(NavNode {
                id,
                position,
                zone_id: zone_id.clone(),
                zone_class: travel_zone.class,
                waypoint_index: u32::try_from(index).unwrap_or(u32::MAX),
                aisle_position,
            });
            ids.push(id);
        }
        if travel_zone.class == ZoneClass::Aisle {
            graph.aisle_zones.insert(zone_id.clone());
        }
        graph.zone_waypoints.insert(zone_id, ids);
    }

    // Intra-zone edges.
    for travel_zone in &travel_zones {
        let ids: Vec<u32> = graph.zone_waypoints[&travel_zone.zone.id].clone();
        match travel_zone.class {
            ZoneClass::Aisle => {
                for (a, b) in ids.iter().copied().tuple_windows() {
                    try_add_edge(&mut graph, a, b, &obstacle_rings);
                }
            }
            ZoneClass::Area => {
                let reach = AREA_EDGE_FACTOR * config.max_step_px;
                for pair in ids.iter().copied().combinations(2) {
                    let (a, b) = (pair[0], pair[1]);
                    let span = distance(
                        graph.nodes[a as usize].position,
                        graph.nodes[b as usize].position,
                    );
                    if span <= reach {
                        try_add_edge(&mut graph, a, b, &obstacle_rings);
                    }
                }
            }
        }
    }

    // Inter-zone connections for adjacent zone pairs.
    let reach = CONNECTION_REACH_FACTOR * config.adjacency_tolerance_px;
    for i in 0..travel_zones.len() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        for j in (i + 1)..travel_zones.len() {
            let (a, b) = (&travel_zones[i], &travel_zones[j]);
            if !zones_adjacent(a, b, config.adjacency_tolerance_px) {
                continue;
            }
            if let Some((u, v, span)) = closest_eligible_pair(&graph, a, b)
                && span <= reach
            {
                try_add_edge(&mut graph, u, v, &obstacle_rings);
            }
        }
    }

    graph.finalise();

    let isolated = graph.isolated_nodes();
    if isolated.is_empty() {
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "navigation graph built"
        );
    } else {
        warn!(
            isolated = isolated.len(),
            nodes = graph.nodes.len(),
            "navigation graph has isolated waypoints"
        );
    }
    Ok(graph)
}

/// Waypoints along an aisle centreline: the start, evenly spaced interior
/// points at most `max_step` apart, and the end. Points inside obstacles
/// are dropped.
fn sample_aisle(
    travel_zone: &TravelZone,
    config: &GraphConfig,
    obstacles: &[&[Coord]],
) -> Vec<Coord> {
    let Some(centreline) = aisle_centreline(&travel_zone.zone.vertices) else {
        return polygon_centroid(&travel_zone.zone.vertices)
            .into_iter()
            .collect();
    };

    let mut samples = vec![centreline[0]];
    for (a, b) in centreline.iter().copied().tuple_windows() {
        let length = distance(a, b);
        if length < f64::EPSILON {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (length / config.max_step_px).ceil().max(1.0) as usize;
        let direction = (b - a) / length;
        for step in 1..steps {
            #[allow(clippy::cast_precision_loss)]
            let offset = length * (step as f64) / (steps as f64);
            samples.push(a + direction * offset);
        }
        samples.push(b);
    }

    samples
        .into_iter()
        .filter(|p| !inside_any(*p, obstacles))
        .collect()
}

/// Waypoints for a 2-D area: the centroid when valid, then a row-major
/// grid over the bounding box, keeping points inside the zone and outside
/// every obstacle. A zone that would otherwise end up empty gets its
/// centroid regardless, so it is never silently isolated.
fn sample_area(
    travel_zone: &TravelZone,
    config: &GraphConfig,
    obstacles: &[&[Coord]],
) -> Vec<Coord> {
    let ring = &travel_zone.zone.vertices;
    let centroid = polygon_centroid(ring);
    let mut samples = Vec::new();

    if let Some(c) = centroid
        && point_in_polygon(c, ring)
        && !inside_any(c, obstacles)
    {
        samples.push(c);
    }

    let centroid_taken = !samples.is_empty();
    let pitch = GRID_PITCH_FACTOR * config.max_step_px;
    if pitch > 0.0 {
        let bounds = travel_zone.bounds;
        let mut y = bounds.min.y + pitch / 2.0;
        while y < bounds.max.y {
            let mut x = bounds.min.x + pitch / 2.0;
            while x < bounds.max.x {
                let p = geo::coord! { x: x, y: y };
                let duplicate = centroid_taken && distance(samples[0], p) < 1e-6;
                if !duplicate && point_in_polygon(p, ring) && !inside_any(p, obstacles) {
                    samples.push(p);
                }
                x += pitch;
            }
            y += pitch;
        }
    }

    if samples.is_empty()
        && let Some(c) = centroid
    {
        samples.push(c);
    }
    samples
}

fn inside_any(point: Coord, rings: &[&[Coord]]) -> bool {
    rings.iter().any(|ring| point_in_polygon(point, ring))
}

/// Whether the open segment `a`–`b` crosses any obstacle boundary.
///
/// The segment is open: a hit coincident with either endpoint (a waypoint
/// grazing a boundary) does not count as a crossing.
fn crosses_any(a: Coord, b: Coord, rings: &[&[Coord]]) -> bool {
    rings.iter().any(|ring| {
        (0..ring.len()).any(|i| {
            let s1 = ring[i];
            let s2 = ring[(i + 1) % ring.len()];
            segment_intersection(a, b, s1, s2)
                .is_some_and(|hit| distance(hit, a) > 1e-9 && distance(hit, b) > 1e-9)
        })
    })
}

/// Adds both directions of an edge unless it crosses an obstacle.
fn try_add_edge(graph: &mut NavGraph, a: u32, b: u32, obstacles: &[&[Coord]]) {
    let pa = graph.nodes[a as usize].position;
    let pb = graph.nodes[b as usize].position;
    if crosses_any(pa, pb, obstacles) {
        return;
    }
    let weight = distance(pa, pb);
    graph.edges.push(NavEdge { from: a, to: b, weight });
    graph.edges.push(NavEdge { from: b, to: a, weight });
}

/// Adjacency: bounding boxes overlap within the tolerance, and the
/// polygons either intersect or have a pair of edges within the tolerance.
fn zones_adjacent(a: &TravelZone, b: &TravelZone, tolerance: f64) -> bool {
    if !a.bounds.expanded(tolerance).intersects(&b.bounds) {
        return false;
    }
    let (ring_a, ring_b) = (&a.zone.vertices, &b.zone.vertices);
    if polygons_overlap(ring_a, ring_b) {
        return true;
    }
    for i in 0..ring_a.len() {
        let a1 = ring_a[i];
        let a2 = ring_a[(i + 1) % ring_a.len()];
        for j in 0..ring_b.len() {
            let b1 = ring_b[j];
            let b2 = ring_b[(j + 1) % ring_b.len()];
            if segment_to_segment_distance(a1, a2, b1, b2) <= tolerance {
                return true;
            }
        }
    }
    false
}

/// The closest pair of connection-eligible waypoints between two zones.
/// Aisle zones offer only their `start`/`end` waypoints; areas offer all.
fn closest_eligible_pair(
    graph: &NavGraph,
    a: &TravelZone,
    b: &TravelZone,
) -> Option<(u32, u32, f64)> {
    let eligible = |zone: &TravelZone| -> Vec<u32> {
        graph.zone_waypoints[&zone.zone.id]
            .iter()
            .copied()
            .filter(|id| {
                let node = &graph.nodes[*id as usize];
                node.zone_class != ZoneClass::Aisle
                    || matches!(
                        node.aisle_position,
                        Some(AislePosition::Start | AislePosition::End)
                    )
            })
            .collect()
    };

    let mut best: Option<(u32, u32, f64)> = None;
    for u in eligible(a) {
        for v in eligible(b) {
            let span = distance(
                graph.nodes[u as usize].position,
                graph.nodes[v as usize].position,
            );
            if best.is_none_or(|(_, _, best_span)| span < best_span) {
                best = Some((u, v, span));
            }
        }
    }
    best
}

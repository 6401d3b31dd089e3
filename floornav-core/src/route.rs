//! # Shortest-path queries
//!
//! Classical Dijkstra over the navigation graph. Failure to route is a
//! result value, never an error: queries against a usable graph always
//! return a [`RouteResult`].

use crate::navgraph::NavGraph;
use crate::spatial::{distance, point_in_polygon};
use crate::zone::Zone;
use geo::Coord;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Why a query produced no path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFailure {
    /// The graph contains no travelable zones.
    NoTravelableZones,
    /// The start or end point lies inside an obstacle.
    PointBlocked,
    /// No usable waypoint exists near the query point.
    PointOutsideTravelableZones,
    /// The graph does not connect the chosen endpoints.
    Unreachable,
}

impl RouteFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteFailure::NoTravelableZones => "no_travelable_zones",
            RouteFailure::PointBlocked => "point_blocked",
            RouteFailure::PointOutsideTravelableZones => "point_outside_travelable_zones",
            RouteFailure::Unreachable => "unreachable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSegment {
    pub from: u32,
    pub to: u32,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub success: bool,
    /// Waypoint positions from start node to end node, inclusive.
    pub points: Vec<Coord>,
    /// Total pixel distance along the path.
    pub total_distance: f64,
    pub segments: Vec<RouteSegment>,
    pub reason: Option<RouteFailure>,
}

impl RouteResult {
    fn failure(reason: RouteFailure) -> Self {
        RouteResult {
            success: false,
            points: Vec::new(),
            total_distance: 0.0,
            segments: Vec::new(),
            reason: Some(reason),
        }
    }
}

/// Finds the shortest path between two arbitrary pixel points.
///
/// Each query point maps to its nearest usable waypoint, preferring
/// waypoints of the zone that contains the point before falling back to
/// the globally nearest one. Points inside an obstacle are rejected as
/// blocked.
pub fn find_path(
    graph: &NavGraph,
    zones: &[Zone],
    obstacles: &[Zone],
    start: Coord,
    end: Coord,
) -> RouteResult {
    if graph.is_empty() {
        return RouteResult::failure(RouteFailure::NoTravelableZones);
    }
    if inside_obstacle(start, obstacles) || inside_obstacle(end, obstacles) {
        return RouteResult::failure(RouteFailure::PointBlocked);
    }

    let Some(start_node) = nearest_usable_node(graph, zones, start) else {
        return RouteResult::failure(RouteFailure::PointOutsideTravelableZones);
    };
    let Some(end_node) = nearest_usable_node(graph, zones, end) else {
        return RouteResult::failure(RouteFailure::PointOutsideTravelableZones);
    };

    let Some((path, total_distance)) = dijkstra(graph, start_node, end_node) else {
        return RouteResult::failure(RouteFailure::Unreachable);
    };

    let points: Vec<Coord> = path
        .iter()
        .map(|id| graph.nodes[*id as usize].position)
        .collect();
    let segments: Vec<RouteSegment> = path
        .windows(2)
        .map(|pair| RouteSegment {
            from: pair[0],
            to: pair[1],
            weight: distance(
                graph.nodes[pair[0] as usize].position,
                graph.nodes[pair[1] as usize].position,
            ),
        })
        .collect();
    RouteResult {
        success: true,
        points,
        total_distance,
        segments,
        reason: None,
    }
}

fn inside_obstacle(point: Coord, obstacles: &[Zone]) -> bool {
    obstacles
        .iter()
        .any(|zone| point_in_polygon(point, &zone.vertices))
}

/// The nearest waypoint usable from a query point.
///
/// Candidates are restricted to the first travelable zone whose polygon
/// contains the point, when there is one; otherwise every node is a
/// candidate. Ties resolve to the lower node id.
fn nearest_usable_node(graph: &NavGraph, zones: &[Zone], point: Coord) -> Option<u32> {
    let containing = zones
        .iter()
        .find(|zone| zone.is_travelable() && point_in_polygon(point, &zone.vertices));
    if let Some(zone) = containing
        && let Some(ids) = graph.zone_waypoints.get(&zone.id)
        && let Some(best) = nearest_of(graph, ids.iter().copied(), point)
    {
        return Some(best);
    }
    nearest_of(graph, graph.nodes.iter().map(|n| n.id), point)
}

fn nearest_of(graph: &NavGraph, ids: impl Iterator<Item = u32>, point: Coord) -> Option<u32> {
    ids.min_by(|a, b| {
        let da = distance(graph.nodes[*a as usize].position, point);
        let db = distance(graph.nodes[*b as usize].position, point);
        da.total_cmp(&db).then_with(|| a.cmp(b))
    })
}

/// Heap entry: cumulative cost plus the node, ordered as a min-heap with
/// node-id tie-breaking for reproducible results.
#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    node: u32,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn dijkstra(graph: &NavGraph, from: u32, to: u32) -> Option<(Vec<u32>, f64)> {
    let mut dist = vec![f64::INFINITY; graph.nodes.len()];
    let mut prev: Vec<Option<u32>> = vec![None; graph.nodes.len()];
    let mut heap = BinaryHeap::new();

    dist[from as usize] = 0.0;
    heap.push(State { cost: 0.0, node: from });

    while let Some(State { cost, node }) = heap.pop() {
        if node == to {
            break;
        }
        if cost > dist[node as usize] {
            continue;
        }
        for edge in graph.neighbours(node) {
            let next = State {
                cost: cost + edge.weight,
                node: edge.to,
            };
            if next.cost < dist[edge.to as usize] {
                dist[edge.to as usize] = next.cost;
                prev[edge.to as usize] = Some(node);
                heap.push(next);
            }
        }
    }

    if dist[to as usize].is_infinite() {
        return None;
    }

    let mut path = vec![to];
    let mut current = to;
    while current != from {
        current = prev[current as usize]?;
        path.push(current);
    }
    path.reverse();
    Some((path, dist[to as usize]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navgraph::{GraphConfig, build_navigation_graph};
    use crate::pipeline::CancelToken;
    use crate::zone::Zone;
    use crate::{Provenance, ZoneVariant};
    use geo::coord;

    fn lane(id: &str, ring: &[(f64, f64)]) -> Zone {
        Zone::new(
            id,
            id,
            ZoneVariant::TravelLane,
            ring.iter().map(|(x, y)| coord! { x: *x, y: *y }).collect(),
            Provenance::Coverage,
        )
    }

    fn obstacle(ring: &[(f64, f64)]) -> Zone {
        Zone::new(
            "obst",
            "Obstacle",
            ZoneVariant::BlockedArea,
            ring.iter().map(|(x, y)| coord! { x: *x, y: *y }).collect(),
            Provenance::Ai,
        )
    }

    fn build(zones: &[Zone], obstacles: &[Zone]) -> NavGraph {
        build_navigation_graph(zones, obstacles, &GraphConfig::default(), &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn routes_across_adjacent_lanes() {
        let zones = vec![
            lane("west", &[(0.0, 0.0), (500.0, 0.0), (500.0, 100.0), (0.0, 100.0)]),
            lane("east", &[(500.0, 0.0), (1000.0, 0.0), (1000.0, 100.0), (500.0, 100.0)]),
        ];
        let graph = build(&zones, &[]);
        let result = find_path(
            &graph,
            &zones,
            &[],
            coord! { x: 100.0, y: 50.0 },
            coord! { x: 900.0, y: 50.0 },
        );
        assert!(result.success, "route failed: {:?}", result.reason);
        assert!(result.points.len() >= 2);
        assert_eq!(result.segments.len(), result.points.len() - 1);

        // Within 10% of the 800 px straight line.
        assert!(
            result.total_distance <= 880.0,
            "path of {} px is too long",
            result.total_distance
        );
        let segment_sum: f64 = result.segments.iter().map(|s| s.weight).sum();
        assert!((segment_sum - result.total_distance).abs() < 1e-9);
    }

    #[test]
    fn empty_graph_reports_no_travelable_zones() {
        let graph = NavGraph::default();
        let result = find_path(
            &graph,
            &[],
            &[],
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 10.0, y: 10.0 },
        );
        assert!(!result.success);
        assert_eq!(result.reason, Some(RouteFailure::NoTravelableZones));
    }

    #[test]
    fn blocked_query_point_is_rejected() {
        let zones = vec![lane("z", &[(0.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0), (0.0, 1000.0)])];
        let obstacles = vec![obstacle(&[(400.0, 400.0), (600.0, 400.0), (600.0, 600.0), (400.0, 600.0)])];
        let graph = build(&zones, &obstacles);
        let result = find_path(
            &graph,
            &zones,
            &obstacles,
            coord! { x: 500.0, y: 500.0 },
            coord! { x: 100.0, y: 100.0 },
        );
        assert!(!result.success);
        assert_eq!(result.reason, Some(RouteFailure::PointBlocked));
    }

    #[test]
    fn disconnected_zones_are_unreachable() {
        let zones = vec![
            lane("a", &[(0.0, 0.0), (400.0, 0.0), (400.0, 400.0), (0.0, 400.0)]),
            lane("b", &[(5000.0, 0.0), (5400.0, 0.0), (5400.0, 400.0), (5000.0, 400.0)]),
        ];
        let graph = build(&zones, &[]);
        let result = find_path(
            &graph,
            &zones,
            &[],
            coord! { x: 200.0, y: 200.0 },
            coord! { x: 5200.0, y: 200.0 },
        );
        assert!(!result.success);
        assert_eq!(result.reason, Some(RouteFailure::Unreachable));
    }

    #[test]
    fn same_zone_waypoints_win_over_globally_nearer_ones() {
        // The thin strip only ever gets its centroid, far from the query
        // point; the big lane has much closer waypoints. The query point
        // is inside the strip, so the strip's centroid must still win.
        let zones = vec![
            lane("strip", &[(0.0, 0.0), (1000.0, 0.0), (1000.0, 30.0), (0.0, 30.0)]),
            lane("hall", &[(0.0, 35.0), (1000.0, 35.0), (1000.0, 1000.0), (0.0, 1000.0)]),
        ];
        let graph = build(&zones, &[]);
        let result = find_path(
            &graph,
            &zones,
            &[],
            coord! { x: 100.0, y: 10.0 },
            coord! { x: 900.0, y: 10.0 },
        );
        assert!(result.success);
        // Both endpoints resolve to the strip's single centroid waypoint.
        assert_eq!(result.points.len(), 1);
        assert!((result.total_distance - 0.0).abs() < 1e-9);
        assert!(distance(result.points[0], coord! { x: 500.0, y: 15.0 }) < 1e-6);
    }

    #[test]
    fn trivial_route_within_one_zone() {
        let zones = vec![lane("z", &[(0.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0), (0.0, 1000.0)])];
        let graph = build(&zones, &[]);
        let result = find_path(
            &graph,
            &zones,
            &[],
            coord! { x: 120.0, y: 120.0 },
            coord! { x: 880.0, y: 880.0 },
        );
        assert!(result.success);
        assert!(result.total_distance > 0.0);
        // Every hop respects the sampling reach.
        for segment in &result.segments {
            assert!(segment.weight <= 1.5 * GraphConfig::default().max_step_px + 1e-9);
        }
    }
}

//! # Planar geometry kernel
//!
//! Pure `f64` predicates and constructions over polygon vertex lists.
//! Everything here is total: degenerate inputs (empty polygons, zero-length
//! segments, collinear edges) produce `None` or identity results rather than
//! errors. Callers in both the millimetre and pixel frames share these
//! routines; frames are tracked by construction, not by type.

use geo::{Coord, coord};

/// Tolerance for floating point predicates.
///
/// Geometry never compares doubles for exact equality; anything within this
/// band is treated as coincident.
pub const EPSILON: f64 = 1e-10;

/// How far past the boundary hit [`move_point_inside`] walks, in frame units.
const INTERIOR_INSET: f64 = 3.0;

#[inline]
fn cross(a: Coord, b: Coord) -> f64 {
    a.x * b.y - a.y * b.x
}

#[inline]
fn dot(a: Coord, b: Coord) -> f64 {
    a.x * b.x + a.y * b.y
}

#[inline]
pub(crate) fn magnitude(v: Coord) -> f64 {
    v.x.hypot(v.y)
}

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: Coord, b: Coord) -> f64 {
    magnitude(b - a)
}

/// Arithmetic mean of a vertex list.
///
/// This is the fallback centre for shapes too degenerate for the shoelace
/// formula, and the anchor used when shrinking obstacle outlines.
pub fn vertex_mean(vertices: &[Coord]) -> Option<Coord> {
    if vertices.is_empty() {
        return None;
    }
    let sum = vertices
        .iter()
        .fold(coord! { x: 0.0, y: 0.0 }, |acc, v| acc + *v);
    #[allow(clippy::cast_precision_loss)]
    let n = vertices.len() as f64;
    Some(sum / n)
}

/// Centroid of a simple polygon by the signed-area (shoelace) formula.
///
/// A single vertex is its own centroid and two vertices yield their
/// midpoint. Near-zero-area polygons fall back to the vertex mean.
pub fn polygon_centroid(vertices: &[Coord]) -> Option<Coord> {
    match vertices {
        [] => None,
        [v] => Some(*v),
        [a, b] => Some((*a + *b) * 0.5),
        _ => {
            let mut signed_area = 0.0;
            let mut cx = 0.0;
            let mut cy = 0.0;
            for i in 0..vertices.len() {
                let p = vertices[i];
                let q = vertices[(i + 1) % vertices.len()];
                let w = p.x * q.y - q.x * p.y;
                signed_area += w;
                cx += (p.x + q.x) * w;
                cy += (p.y + q.y) * w;
            }
            signed_area *= 0.5;
            if signed_area.abs() < EPSILON {
                return vertex_mean(vertices);
            }
            Some(coord! { x: cx / (6.0 * signed_area), y: cy / (6.0 * signed_area) })
        }
    }
}

/// Absolute polygon area by the shoelace formula; 0 for fewer than three
/// vertices.
pub fn polygon_area(vertices: &[Coord]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..vertices.len() {
        let p = vertices[i];
        let q = vertices[(i + 1) % vertices.len()];
        twice_area += p.x * q.y - q.x * p.y;
    }
    twice_area.abs() / 2.0
}

/// Axis-aligned bounding box in continuous coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Coord,
    pub max: Coord,
}

impl Aabb {
    pub fn from_vertices(vertices: &[Coord]) -> Option<Aabb> {
        let first = vertices.first()?;
        let mut bounds = Aabb { min: *first, max: *first };
        for v in &vertices[1..] {
            bounds.min.x = bounds.min.x.min(v.x);
            bounds.min.y = bounds.min.y.min(v.y);
            bounds.max.x = bounds.max.x.max(v.x);
            bounds.max.y = bounds.max.y.max(v.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Grows the box by `margin` on every side.
    #[must_use]
    pub fn expanded(self, margin: f64) -> Aabb {
        Aabb {
            min: coord! { x: self.min.x - margin, y: self.min.y - margin },
            max: coord! { x: self.max.x + margin, y: self.max.y + margin },
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    pub fn contains(&self, point: Coord) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Integer-pixel emission of the box. Extents are clamped non-negative.
    pub fn to_pixel_bounds(&self) -> PixelBounds {
        #[allow(clippy::cast_possible_truncation)]
        let x = self.min.x.round() as i64;
        #[allow(clippy::cast_possible_truncation)]
        let y = self.min.y.round() as i64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let width = (self.max.x.round() - self.min.x.round()).max(0.0) as u64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let height = (self.max.y.round() - self.min.y.round()).max(0.0) as u64;
        PixelBounds { x, y, width, height }
    }
}

/// A bounding box in whole pixels, as emitted at output boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x: i64,
    pub y: i64,
    pub width: u64,
    pub height: u64,
}

impl PixelBounds {
    /// The box's top-left corner as a continuous coordinate.
    pub fn origin(&self) -> Coord {
        #[allow(clippy::cast_precision_loss)]
        let (x, y) = (self.x as f64, self.y as f64);
        coord! { x: x, y: y }
    }
}

/// Ray-casting point-in-polygon along the +x direction.
///
/// Uses the `yi > y != yj > y` straddle test. Points exactly on the
/// boundary may land on either side; callers that need "inside or on
/// boundary" should also check [`closest_point_on_boundary`].
pub fn point_in_polygon(point: Coord, polygon: &[Coord]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Intersection of two closed segments.
///
/// Returns the intersection point when both line parameters fall in
/// `[0, 1]`. Parallel or degenerate segments return `None`.
pub fn segment_intersection(a1: Coord, a2: Coord, b1: Coord, b2: Coord) -> Option<Coord> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = cross(r, s);
    if denom.abs() < EPSILON {
        return None;
    }
    let qp = b1 - a1;
    let t = cross(qp, s) / denom;
    let u = cross(qp, r) / denom;
    if (-EPSILON..=1.0 + EPSILON).contains(&t) && (-EPSILON..=1.0 + EPSILON).contains(&u) {
        Some(a1 + r * t)
    } else {
        None
    }
}

/// Intersection of a ray (origin + non-zero direction) with a segment.
///
/// Returns the hit point and its unsigned distance from the origin when the
/// ray parameter is non-negative and the segment parameter is in `[0, 1]`.
pub fn ray_segment_intersection(
    origin: Coord,
    direction: Coord,
    s1: Coord,
    s2: Coord,
) -> Option<(Coord, f64)> {
    let len = magnitude(direction);
    if len < EPSILON {
        return None;
    }
    let e = s2 - s1;
    let denom = cross(direction, e);
    if denom.abs() < EPSILON {
        return None;
    }
    let qp = s1 - origin;
    let t = cross(qp, e) / denom;
    let u = cross(qp, direction) / denom;
    if t >= -EPSILON && (-EPSILON..=1.0 + EPSILON).contains(&u) {
        let t = t.max(0.0);
        Some((origin + direction * t, t * len))
    } else {
        None
    }
}

/// Closest non-trivial hit of a ray against a polygon boundary.
///
/// Hits closer than [`EPSILON`] to the origin are skipped so a ray cast
/// from a boundary point does not immediately terminate on itself.
pub fn first_ray_polygon_hit(
    origin: Coord,
    direction: Coord,
    polygon: &[Coord],
) -> Option<(Coord, f64)> {
    if polygon.len() < 2 {
        return None;
    }
    let mut best: Option<(Coord, f64)> = None;
    for i in 0..polygon.len() {
        let s1 = polygon[i];
        let s2 = polygon[(i + 1) % polygon.len()];
        if let Some((point, dist)) = ray_segment_intersection(origin, direction, s1, s2)
            && dist > EPSILON
            && best.is_none_or(|(_, best_dist)| dist < best_dist)
        {
            best = Some((point, dist));
        }
    }
    best
}

/// Closest point to `p` on the segment `[a, b]`.
pub fn closest_point_on_segment(p: Coord, a: Coord, b: Coord) -> Coord {
    let ab = b - a;
    let len_sq = dot(ab, ab);
    if len_sq < EPSILON {
        return a;
    }
    let t = (dot(p - a, ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Perpendicular-foot distance from `p` to the segment `[a, b]`.
pub fn point_to_segment_distance(p: Coord, a: Coord, b: Coord) -> f64 {
    distance(p, closest_point_on_segment(p, a, b))
}

/// Minimum distance between two closed segments. Zero if they intersect.
pub fn segment_to_segment_distance(a1: Coord, a2: Coord, b1: Coord, b2: Coord) -> f64 {
    if segment_intersection(a1, a2, b1, b2).is_some() {
        return 0.0;
    }
    point_to_segment_distance(a1, b1, b2)
        .min(point_to_segment_distance(a2, b1, b2))
        .min(point_to_segment_distance(b1, a1, a2))
        .min(point_to_segment_distance(b2, a1, a2))
}

/// Closest point on a polygon boundary, with its distance.
pub fn closest_point_on_boundary(point: Coord, polygon: &[Coord]) -> Option<(Coord, f64)> {
    match polygon {
        [] => None,
        [v] => Some((*v, distance(point, *v))),
        _ => {
            let mut best: Option<(Coord, f64)> = None;
            for i in 0..polygon.len() {
                let a = polygon[i];
                let b = polygon[(i + 1) % polygon.len()];
                let candidate = closest_point_on_segment(point, a, b);
                let dist = distance(point, candidate);
                if best.is_none_or(|(_, best_dist)| dist < best_dist) {
                    best = Some((candidate, dist));
                }
            }
            best
        }
    }
}

/// Moves a point to the interior of a polygon, if it is not already there.
///
/// Casts a ray from the point toward the polygon centroid and steps a small
/// inset past the first boundary crossing. If the inset lands outside again
/// (a neck thinner than the inset), the boundary hit itself is returned.
pub fn move_point_inside(point: Coord, polygon: &[Coord]) -> Coord {
    if polygon.len() < 3 || point_in_polygon(point, polygon) {
        return point;
    }
    let Some(centroid) = polygon_centroid(polygon) else {
        return point;
    };
    let toward = centroid - point;
    if magnitude(toward) < EPSILON {
        return point;
    }
    match first_ray_polygon_hit(point, toward, polygon) {
        Some((hit, _)) => {
            let unit = toward / magnitude(toward);
            let moved = hit + unit * INTERIOR_INSET;
            if point_in_polygon(moved, polygon) {
                moved
            } else {
                hit
            }
        }
        // The ray missed entirely (possible for points past a convex hull
        // corner when the centroid fell on the boundary); snap instead.
        None => closest_point_on_boundary(point, polygon).map_or(point, |(p, _)| p),
    }
}

/// Number of distinct vertices in a ring, within [`EPSILON`].
///
/// Rings with fewer than three distinct vertices are degenerate and are
/// dropped by the zone generators.
pub fn distinct_vertex_count(vertices: &[Coord]) -> usize {
    let mut distinct: Vec<Coord> = Vec::new();
    for v in vertices {
        if !distinct.iter().any(|d| distance(*d, *v) < EPSILON) {
            distinct.push(*v);
        }
    }
    distinct.len()
}

/// Whether two polygons overlap: cheap AABB reject, then any vertex of one
/// inside the other, then any pair of edges crossing.
pub fn polygons_overlap(a: &[Coord], b: &[Coord]) -> bool {
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    let (Some(bounds_a), Some(bounds_b)) = (Aabb::from_vertices(a), Aabb::from_vertices(b)) else {
        return false;
    };
    if !bounds_a.intersects(&bounds_b) {
        return false;
    }
    if a.iter().any(|v| point_in_polygon(*v, b)) || b.iter().any(|v| point_in_polygon(*v, a)) {
        return true;
    }
    for i in 0..a.len() {
        let a1 = a[i];
        let a2 = a[(i + 1) % a.len()];
        for j in 0..b.len() {
            let b1 = b[j];
            let b2 = b[(j + 1) % b.len()];
            if segment_intersection(a1, a2, b1, b2).is_some() {
                return true;
            }
        }
    }
    false
}

//! # The zone entity
//!
//! Zones are the common currency of the pipeline: aisle corridors, travel
//! lanes and obstacles are all polygons in the pixel frame with a variant,
//! a provenance and an open-ended property bag. Zones are owned by the
//! stage that emitted them and are not mutated afterwards, except through
//! [`Zone::replace_vertices`].

use crate::spatial::Aabb;
use crate::{Provenance, ZoneVariant};
use chrono::{DateTime, Utc};
use geo::Coord;
use std::collections::BTreeMap;

/// Recognised keys of the auxiliary property bag.
///
/// Consumers must treat unrecognised keys as opaque.
pub mod props {
    pub const TDOA_SLOT: &str = "tdoaSlot";
    pub const SOURCE_ANCHOR: &str = "sourceAnchor";
    pub const DEST_ANCHOR: &str = "destAnchor";
    pub const MARGIN_MM: &str = "marginMm";
    pub const DISTANCE_MM: &str = "distanceMm";
    pub const DIRECTION: &str = "direction";
    pub const PARENT_COVERAGE_ID: &str = "parentCoverageId";
    pub const BLOCKED_REASON: &str = "blockedReason";
    pub const COVERAGE_UID: &str = "coverageUid";
    pub const COVERAGE_TYPE: &str = "coverageType";
    pub const THRESHOLD_MM: &str = "thresholdMm";
    pub const ANCHOR_SEQUENCE: &str = "anchorSequence";
}

/// Presentation-oriented zone attributes. None of these affect routing.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMetadata {
    pub visible: bool,
    pub locked: bool,
    pub description: String,
    pub color_hint: Option<String>,
    pub opacity_hint: Option<f64>,
}

impl Default for ZoneMetadata {
    fn default() -> Self {
        ZoneMetadata {
            visible: true,
            locked: false,
            description: String::new(),
            color_hint: None,
            opacity_hint: None,
        }
    }
}

/// A polygonal region of the floorplan in the pixel frame.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub variant: ZoneVariant,
    pub vertices: Vec<Coord>,
    /// Provider confidence in `[0, 1]`, where one exists.
    pub confidence: Option<f64>,
    pub provenance: Provenance,
    pub metadata: ZoneMetadata,
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        variant: ZoneVariant,
        vertices: Vec<Coord>,
        provenance: Provenance,
    ) -> Self {
        let now = Utc::now();
        Zone {
            id: id.into(),
            name: name.into(),
            variant,
            vertices,
            confidence: None,
            provenance,
            metadata: ZoneMetadata::default(),
            properties: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Travelability is derived from the variant, never stored.
    pub fn is_travelable(&self) -> bool {
        self.variant.is_travelable()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_vertices(&self.vertices)
    }

    /// The one sanctioned mutation: swap the polygon and bump the update
    /// timestamp.
    pub fn replace_vertices(&mut self, vertices: Vec<Coord>) {
        self.vertices = vertices;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn quad() -> Vec<Coord> {
        vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 0.0, y: 10.0 },
        ]
    }

    #[test]
    fn travelability_follows_variant() {
        let lane = Zone::new("z1", "Lane", ZoneVariant::TravelLane, quad(), Provenance::Coverage);
        let rack = Zone::new("z2", "Rack", ZoneVariant::Racking, quad(), Provenance::Manual);
        assert!(lane.is_travelable());
        assert!(!rack.is_travelable());
    }

    #[test]
    fn property_bag() {
        let zone = Zone::new("z", "Z", ZoneVariant::AislePath, quad(), Provenance::Tdoa)
            .with_property(props::TDOA_SLOT, "slot-3")
            .with_property("customKey", "opaque");
        assert_eq!(zone.property(props::TDOA_SLOT), Some("slot-3"));
        assert_eq!(zone.property("customKey"), Some("opaque"));
        assert_eq!(zone.property(props::DIRECTION), None);
    }

    #[test]
    fn confidence_is_clamped() {
        let zone = Zone::new("z", "Z", ZoneVariant::BlockedArea, quad(), Provenance::Ai)
            .with_confidence(1.7);
        assert_eq!(zone.confidence, Some(1.0));
    }

    #[test]
    fn replace_vertices_bumps_updated_at() {
        let mut zone = Zone::new("z", "Z", ZoneVariant::TravelLane, quad(), Provenance::Coverage);
        let created = zone.created_at;
        zone.replace_vertices(quad());
        assert!(zone.updated_at >= created);
    }
}

//! # Record mirrors and the millimetre-frame zone exchange format
//!
//! Domain types stay serde-free; this module converts them into plain
//! serializable records instead. Zone records travel in the millimetre
//! frame (via the transformer inverse) so they survive recalibration;
//! graph and route records are pixel-frame output with integer rounding
//! applied at this boundary.

use crate::calibrate::PixelTransformer;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::navgraph::{NavEdge, NavGraph};
use crate::parse::MmPoint;
use crate::route::RouteResult;
use crate::zone::Zone;
use crate::{Provenance, ZoneVariant};
use chrono::{DateTime, Utc};
use geo::{Coord, coord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneTypeRecord {
    pub id: u8,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneGeometryRecord {
    /// Ring vertices in the millimetre world frame.
    pub positions: Vec<MmPoint>,
}

/// The interchange record for one zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedZoneRecord {
    pub name: String,
    pub uid: String,
    pub zone_id: u32,
    pub active: bool,
    pub shape: String,
    pub zone_type: ZoneTypeRecord,
    pub zone_geometry: ZoneGeometryRecord,
    pub zone_mode: String,
    pub priority: i32,
    pub sublocation_uid: String,
    pub project_uid: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Exports zones to millimetre-frame records, in input order.
pub fn export_zones(
    zones: &[Zone],
    transformer: &PixelTransformer,
    sublocation_uid: &str,
    project_uid: &str,
) -> Vec<ExportedZoneRecord> {
    zones
        .iter()
        .enumerate()
        .map(|(index, zone)| {
            let positions = transformer
                .polygon_to_mm(&zone.vertices)
                .into_iter()
                .map(MmPoint::from)
                .collect();
            ExportedZoneRecord {
                name: zone.name.clone(),
                uid: zone.id.clone(),
                zone_id: u32::try_from(index + 1).unwrap_or(u32::MAX),
                active: zone.metadata.visible,
                shape: "polygon".to_string(),
                zone_type: ZoneTypeRecord {
                    id: u8::from(zone.variant),
                    name: zone.variant.external_name().to_string(),
                    display_name: zone.variant.display_name().to_string(),
                },
                zone_geometry: ZoneGeometryRecord { positions },
                zone_mode: if zone.is_travelable() {
                    "travel".to_string()
                } else {
                    "blocked".to_string()
                },
                priority: 0,
                sublocation_uid: sublocation_uid.to_string(),
                project_uid: project_uid.to_string(),
                created_at: zone.created_at.to_rfc3339(),
                updated_at: zone.updated_at.to_rfc3339(),
            }
        })
        .collect()
}

/// Re-imports zone records, mapping positions back through the
/// transformer and rounding to integer pixels.
///
/// Unknown zone-type names fall back to [`ZoneVariant::Other`] with a
/// warning; unparseable timestamps fall back to the import time.
pub fn import_zones(
    records: &[ExportedZoneRecord],
    transformer: &PixelTransformer,
) -> (Vec<Zone>, Vec<Diagnostic>) {
    let mut zones = Vec::new();
    let mut diagnostics = Vec::new();

    for record in records {
        let variant = match ZoneVariant::from_external_name(&record.zone_type.name) {
            Some(variant) => variant,
            None => {
                diagnostics.push(Diagnostic::with_subject(
                    DiagnosticCode::InvalidInput,
                    format!(
                        "Unknown zone type {:?}; imported as \"other\"",
                        record.zone_type.name
                    ),
                    record.uid.clone(),
                ));
                ZoneVariant::Other
            }
        };

        let vertices: Vec<Coord> = record
            .zone_geometry
            .positions
            .iter()
            .map(|p| {
                let px = transformer.to_pixels(Coord::from(*p));
                coord! { x: px.x.round(), y: px.y.round() }
            })
            .collect();

        let mut zone = Zone::new(
            record.uid.clone(),
            record.name.clone(),
            variant,
            vertices,
            Provenance::Imported,
        );
        zone.metadata.visible = record.active;
        zone.created_at = parse_timestamp(&record.created_at);
        zone.updated_at = parse_timestamp(&record.updated_at);
        zones.push(zone);
    }
    (zones, diagnostics)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map_or_else(|_| Utc::now(), |t| t.with_timezone(&Utc))
}

/// A pixel position rounded at the output boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PixelPointRecord {
    pub x: i64,
    pub y: i64,
}

impl From<Coord> for PixelPointRecord {
    #[allow(clippy::cast_possible_truncation)]
    fn from(c: Coord) -> Self {
        PixelPointRecord {
            x: c.x.round() as i64,
            y: c.y.round() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNodeRecord {
    pub id: u32,
    pub position: PixelPointRecord,
    pub zone_id: String,
    pub zone_class: &'static str,
    pub waypoint_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aisle_position: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GraphEdgeRecord {
    pub from: u32,
    pub to: u32,
    pub weight: f64,
}

impl From<&NavEdge> for GraphEdgeRecord {
    fn from(edge: &NavEdge) -> Self {
        GraphEdgeRecord {
            from: edge.from,
            to: edge.to,
            weight: edge.weight,
        }
    }
}

/// The navigation-graph output contract: both directions of every edge
/// are present explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct GraphRecord {
    pub nodes: Vec<GraphNodeRecord>,
    pub edges: Vec<GraphEdgeRecord>,
    pub zone_waypoints: BTreeMap<String, Vec<u32>>,
}

pub fn graph_record(graph: &NavGraph) -> GraphRecord {
    GraphRecord {
        nodes: graph
            .nodes
            .iter()
            .map(|node| GraphNodeRecord {
                id: node.id,
                position: PixelPointRecord::from(node.position),
                zone_id: node.zone_id.clone(),
                zone_class: node.zone_class.as_str(),
                waypoint_index: node.waypoint_index,
                aisle_position: node.aisle_position.map(|p| p.as_str()),
            })
            .collect(),
        edges: graph.edges.iter().map(GraphEdgeRecord::from).collect(),
        zone_waypoints: graph.zone_waypoints.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteRecord {
    pub success: bool,
    pub points: Vec<PixelPointRecord>,
    pub total_distance: f64,
    pub segments: Vec<GraphEdgeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

pub fn route_record(result: &RouteResult) -> RouteRecord {
    RouteRecord {
        success: result.success,
        points: result
            .points
            .iter()
            .map(|p| PixelPointRecord::from(*p))
            .collect(),
        total_distance: result.total_distance,
        segments: result
            .segments
            .iter()
            .map(|s| GraphEdgeRecord {
                from: s.from,
                to: s.to,
                weight: s.weight,
            })
            .collect(),
        reason: result.reason.map(|r| r.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::CalibrationRecord;
    use crate::zone::Zone;

    fn transformer() -> PixelTransformer {
        let record = CalibrationRecord {
            filename: String::new(),
            width: 2000,
            height: 1000,
            centre_px_x: 900.0,
            centre_px_y: 450.0,
            raw_scale: 0.07,
            rotation: None,
            sublocation_uid: String::new(),
        };
        PixelTransformer::new(&record).unwrap()
    }

    fn pixel_zone(id: &str, variant: ZoneVariant) -> Zone {
        Zone::new(
            id,
            "Zone",
            variant,
            vec![
                coord! { x: 10.0, y: 20.0 },
                coord! { x: 400.0, y: 20.0 },
                coord! { x: 400.0, y: 300.0 },
                coord! { x: 10.0, y: 300.0 },
            ],
            Provenance::Coverage,
        )
    }

    #[test]
    fn export_then_import_round_trips_pixel_polygons() {
        let transformer = transformer();
        let zones = vec![
            pixel_zone("lane-1", ZoneVariant::TravelLane),
            pixel_zone("blocked-1", ZoneVariant::BlockedArea),
        ];
        let records = export_zones(&zones, &transformer, "sl-1", "proj-1");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].zone_id, 1);
        assert_eq!(records[0].zone_type.name, "travel_lane");
        assert_eq!(records[0].zone_mode, "travel");
        assert_eq!(records[1].zone_mode, "blocked");

        let (imported, diagnostics) = import_zones(&records, &transformer);
        assert!(diagnostics.is_empty());
        for (original, round_tripped) in zones.iter().zip(&imported) {
            assert_eq!(original.vertices.len(), round_tripped.vertices.len());
            for (a, b) in original.vertices.iter().zip(&round_tripped.vertices) {
                assert_eq!(a.x.round(), b.x);
                assert_eq!(a.y.round(), b.y);
            }
            assert_eq!(original.variant, round_tripped.variant);
            assert_eq!(round_tripped.provenance, Provenance::Imported);
        }
    }

    #[test]
    fn unknown_type_name_falls_back_to_other() {
        let transformer = transformer();
        let zones = vec![pixel_zone("z", ZoneVariant::TravelLane)];
        let mut records = export_zones(&zones, &transformer, "", "");
        records[0].zone_type.name = "teleporter_pad".to_string();

        let (imported, diagnostics) = import_zones(&records, &transformer);
        assert_eq!(imported[0].variant, ZoneVariant::Other);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::InvalidInput);
    }

    #[test]
    fn every_variant_exports_a_name_that_imports_back() {
        let transformer = transformer();
        for id in 0u8..=16 {
            let variant = ZoneVariant::try_from(id).unwrap();
            let records = export_zones(&[pixel_zone("z", variant)], &transformer, "", "");
            let (imported, diagnostics) = import_zones(&records, &transformer);
            assert!(diagnostics.is_empty(), "variant {variant:?} warned");
            assert_eq!(imported[0].variant, variant);
        }
    }

    #[test]
    fn timestamps_survive_the_round_trip() {
        let transformer = transformer();
        let zones = vec![pixel_zone("z", ZoneVariant::TravelLane)];
        let records = export_zones(&zones, &transformer, "", "");
        let (imported, _) = import_zones(&records, &transformer);
        assert_eq!(imported[0].created_at, zones[0].created_at);
    }

    #[test]
    fn pixel_records_round_positions() {
        let point = PixelPointRecord::from(coord! { x: 10.6, y: -3.4 });
        assert_eq!(point, PixelPointRecord { x: 11, y: -3 });
    }
}

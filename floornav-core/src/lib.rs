#![doc = include_str!("../README.md")]

pub mod calibrate;
pub mod containment;
pub mod corridor;
pub mod error;
pub mod export;
pub mod lane;
pub mod navgraph;
pub mod parse;
pub mod pipeline;
pub mod route;
pub mod spatial;
pub mod zone;

use num_enum::{IntoPrimitive, TryFromPrimitive};

// Pub use for re-export without too many levels of hierarchy.
// Most modules only have a couple of definitions callers need,
// so this flattens things for better ergonomics.
pub use error::{Diagnostic, DiagnosticCode};
pub use pipeline::CancelToken;
pub use zone::Zone;

/// The closed zone taxonomy.
///
/// Travelability is a property of the variant (see
/// [`ZoneVariant::is_travelable`]), never stored on a zone. The numeric
/// discriminants are stable and are what the export record carries as
/// `zone_type.id`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum ZoneVariant {
    TravelLane = 0,
    AislePath = 1,
    ParkingLot = 2,
    /// Legacy, ambiguous between a corridor and its surroundings; requires
    /// explicit reclassification before routing.
    Aisle = 3,
    OpenFloor = 4,
    Racking = 5,
    RackingArea = 6,
    DockingArea = 7,
    ConveyorArea = 8,
    Administrative = 9,
    StorageFloor = 10,
    StagingArea = 11,
    ChargingStation = 12,
    HazardZone = 13,
    Restricted = 14,
    BlockedArea = 15,
    Other = 16,
}

impl ZoneVariant {
    /// The travelable whitelist. Everything else, including the legacy
    /// `Aisle` and `OpenFloor` variants, is non-travelable.
    pub const fn is_travelable(self) -> bool {
        matches!(
            self,
            ZoneVariant::TravelLane | ZoneVariant::AislePath | ZoneVariant::ParkingLot
        )
    }

    /// The external (wire) name. Total: every variant has exactly one.
    pub const fn external_name(self) -> &'static str {
        match self {
            ZoneVariant::TravelLane => "travel_lane",
            ZoneVariant::AislePath => "aisle_path",
            ZoneVariant::ParkingLot => "parking_lot",
            ZoneVariant::Aisle => "aisle",
            ZoneVariant::OpenFloor => "open_floor",
            ZoneVariant::Racking => "racking",
            ZoneVariant::RackingArea => "racking_area",
            ZoneVariant::DockingArea => "docking_area",
            ZoneVariant::ConveyorArea => "conveyor_area",
            ZoneVariant::Administrative => "administrative",
            ZoneVariant::StorageFloor => "storage_floor",
            ZoneVariant::StagingArea => "staging_area",
            ZoneVariant::ChargingStation => "charging_station",
            ZoneVariant::HazardZone => "hazard_zone",
            ZoneVariant::Restricted => "restricted",
            ZoneVariant::BlockedArea => "blocked_area",
            ZoneVariant::Other => "other",
        }
    }

    /// Inverse of [`ZoneVariant::external_name`]. Importers fall back to
    /// [`ZoneVariant::Other`] (with a warning) on `None`.
    pub fn from_external_name(name: &str) -> Option<ZoneVariant> {
        Some(match name {
            "travel_lane" => ZoneVariant::TravelLane,
            "aisle_path" => ZoneVariant::AislePath,
            "parking_lot" => ZoneVariant::ParkingLot,
            "aisle" => ZoneVariant::Aisle,
            "open_floor" => ZoneVariant::OpenFloor,
            "racking" => ZoneVariant::Racking,
            "racking_area" => ZoneVariant::RackingArea,
            "docking_area" => ZoneVariant::DockingArea,
            "conveyor_area" => ZoneVariant::ConveyorArea,
            "administrative" => ZoneVariant::Administrative,
            "storage_floor" => ZoneVariant::StorageFloor,
            "staging_area" => ZoneVariant::StagingArea,
            "charging_station" => ZoneVariant::ChargingStation,
            "hazard_zone" => ZoneVariant::HazardZone,
            "restricted" => ZoneVariant::Restricted,
            "blocked_area" => ZoneVariant::BlockedArea,
            "other" => ZoneVariant::Other,
            _ => return None,
        })
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            ZoneVariant::TravelLane => "Travel Lane",
            ZoneVariant::AislePath => "Aisle Path",
            ZoneVariant::ParkingLot => "Parking Lot",
            ZoneVariant::Aisle => "Aisle",
            ZoneVariant::OpenFloor => "Open Floor",
            ZoneVariant::Racking => "Racking",
            ZoneVariant::RackingArea => "Racking Area",
            ZoneVariant::DockingArea => "Docking Area",
            ZoneVariant::ConveyorArea => "Conveyor Area",
            ZoneVariant::Administrative => "Administrative",
            ZoneVariant::StorageFloor => "Storage Floor",
            ZoneVariant::StagingArea => "Staging Area",
            ZoneVariant::ChargingStation => "Charging Station",
            ZoneVariant::HazardZone => "Hazard Zone",
            ZoneVariant::Restricted => "Restricted",
            ZoneVariant::BlockedArea => "Blocked Area",
            ZoneVariant::Other => "Other",
        }
    }
}

/// Where a zone came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Generated from a 1-D anchor pair or chain.
    Tdoa,
    /// Lifted from a 2-D coverage polygon.
    Coverage,
    /// Produced by a vision-language obstacle provider.
    Ai,
    Manual,
    Imported,
}

impl Provenance {
    pub const fn as_str(self) -> &'static str {
        match self {
            Provenance::Tdoa => "tdoa",
            Provenance::Coverage => "coverage",
            Provenance::Ai => "ai",
            Provenance::Manual => "manual",
            Provenance::Imported => "imported",
        }
    }
}

//! # Input parsers
//!
//! Stateless validation of the four input surfaces: anchor tables, pair
//! schedules, coverage polygon sets, and the calibration record. Parsers
//! skip recoverable per-record problems with a
//! [`Diagnostic`](crate::error::Diagnostic) and reserve errors for
//! structural failures (wrong row width, undecodable records).

mod anchor;
mod coverage;
mod schedule;

pub use anchor::{Anchor, AnchorPosition, parse_anchors};
pub use coverage::{
    CoverageGeometry, CoverageKind, CoveragePolygon, MmPoint, parse_coverage,
};
pub use schedule::{
    AnchorPair, PairDimension, SCHEDULE_COLUMNS, parse_schedule, serialize_schedule,
};

use crate::calibrate::CalibrationRecord;
use crate::error::ParseError;
use serde_json::Value;

/// Decodes a calibration record from JSON bytes.
///
/// # Errors
///
/// Fails when the body is not valid JSON for the record shape. Range
/// invariants (positive dimensions and scale) are enforced later, at
/// transformer construction.
pub fn parse_calibration(bytes: &[u8]) -> Result<CalibrationRecord, ParseError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Accepts either a bare JSON array or an object wrapping one under
/// `field`, which is how the upstream tools emit their record files.
pub(crate) fn record_array(value: Value, field: &'static str) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ParseError::MalformedRecord(format!(
                "expected an object with a {field:?} array"
            ))),
        },
        _ => Err(ParseError::MalformedRecord(format!(
            "expected an array or an object with a {field:?} array"
        ))),
    }
}

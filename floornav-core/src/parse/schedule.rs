use crate::error::ParseError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The pair schedule is an eight-column table.
pub const SCHEDULE_COLUMNS: usize = 8;

const SCHEDULE_HEADER: [&str; SCHEDULE_COLUMNS] = [
    "#",
    "Source",
    "Destination",
    "Slot",
    "Dimension",
    "Distance",
    "Boundary",
    "Margin",
];

/// Whether a pair defines an aisle corridor (1-D) or is informational (2-D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairDimension {
    OneD,
    TwoD,
}

impl PairDimension {
    pub const fn as_str(self) -> &'static str {
        match self {
            PairDimension::OneD => "1D",
            PairDimension::TwoD => "2D",
        }
    }
}

impl FromStr for PairDimension {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1d" => Ok(PairDimension::OneD),
            "2d" => Ok(PairDimension::TwoD),
            _ => Err(()),
        }
    }
}

impl Display for PairDimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedule row: a directed anchor-to-anchor relation.
///
/// `margin_mm` is twice the corridor half-width; `distance_mm` is
/// informational.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorPair {
    pub row: u32,
    pub source: String,
    pub destination: String,
    pub slot: String,
    pub dimension: PairDimension,
    pub distance_mm: f64,
    pub boundary: String,
    pub margin_mm: f64,
}

fn numeric_field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    field: &'static str,
    line: usize,
) -> Result<T, ParseError> {
    let raw = record.get(index).unwrap_or("");
    raw.parse().map_err(|_| ParseError::InvalidField {
        line,
        field,
        value: raw.to_string(),
    })
}

/// Parses the pair schedule from tabular text.
///
/// Line endings (LF, CRLF, lone CR) are normalised first. Quoted fields
/// keep embedded commas, and doubled quotes decode to a literal quote. A
/// leading header row is skipped when its first token is `#`, `id` or
/// `row` (case-insensitive).
///
/// # Errors
///
/// Rows narrower than eight columns and non-numeric numeric fields are
/// errors carrying the offending 1-based line number.
pub fn parse_schedule(input: &str) -> Result<Vec<AnchorPair>, ParseError> {
    let normalised = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(normalised.as_bytes());

    let mut pairs = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(index + 1);
        if record.iter().all(str::is_empty) {
            continue;
        }
        if index == 0 && is_header(&record) {
            continue;
        }
        if record.len() < SCHEDULE_COLUMNS {
            return Err(ParseError::RowWidth {
                line,
                expected: SCHEDULE_COLUMNS,
                got: record.len(),
            });
        }
        let dimension_raw = record.get(4).unwrap_or("");
        let dimension =
            dimension_raw
                .parse::<PairDimension>()
                .map_err(|()| ParseError::InvalidField {
                    line,
                    field: "dimension",
                    value: dimension_raw.to_string(),
                })?;
        pairs.push(AnchorPair {
            row: numeric_field(&record, 0, "row", line)?,
            source: record[1].to_string(),
            destination: record[2].to_string(),
            slot: record[3].to_string(),
            dimension,
            distance_mm: numeric_field(&record, 5, "distance", line)?,
            boundary: record[6].to_string(),
            margin_mm: numeric_field(&record, 7, "margin", line)?,
        });
    }
    Ok(pairs)
}

fn is_header(record: &csv::StringRecord) -> bool {
    let first = record.get(0).unwrap_or("").to_ascii_lowercase();
    matches!(first.as_str(), "#" | "id" | "row")
}

/// Writes the canonical header and rows; the inverse of
/// [`parse_schedule`] on well-formed input.
///
/// # Errors
///
/// Only I/O-level writer failures, which cannot occur for the in-memory
/// buffer, surface here.
pub fn serialize_schedule(pairs: &[AnchorPair]) -> Result<String, ParseError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SCHEDULE_HEADER)?;
    for pair in pairs {
        writer.write_record([
            pair.row.to_string().as_str(),
            &pair.source,
            &pair.destination,
            &pair.slot,
            pair.dimension.as_str(),
            pair.distance_mm.to_string().as_str(),
            &pair.boundary,
            pair.margin_mm.to_string().as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ParseError::MalformedRecord(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ParseError::MalformedRecord(e.to_string()))
}

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Stable short codes attached to non-fatal diagnostics.
///
/// Per-record and per-artefact problems are reported through these rather
/// than errors: the offending record is skipped and the pipeline continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    /// Structurally malformed record (missing fields, non-numeric values).
    InvalidInput,
    /// A pair references an anchor name that is absent from the anchor table.
    UnresolvedReference,
    /// Zero-length segment, zero-margin corridor, or a polygon with fewer
    /// than three distinct vertices after transformation.
    DegenerateGeometry,
    /// Scale validation found fewer than 80% of anchors inside the image.
    ScaleAnomaly,
    /// An obstacle lies entirely outside its parent coverage, or could not
    /// be repaired into it.
    ContainmentViolation,
}

impl DiagnosticCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::InvalidInput => "invalid_input",
            DiagnosticCode::UnresolvedReference => "unresolved_reference",
            DiagnosticCode::DegenerateGeometry => "degenerate_geometry",
            DiagnosticCode::ScaleAnomaly => "scale_anomaly",
            DiagnosticCode::ContainmentViolation => "containment_violation",
        }
    }
}

impl Display for DiagnosticCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single non-fatal finding: a stable code, a human message, and the
/// offending identifier where one exists (anchor name, slot, coverage uid).
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub subject: Option<String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            subject: None,
        }
    }

    pub fn with_subject(
        code: DiagnosticCode,
        message: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            subject: Some(subject.into()),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "[{}] {} ({subject})", self.code, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Errors constructing a pixel transformer from a calibration record.
///
/// These are whole-input errors: without a usable calibration there is no
/// pixel frame, so nothing downstream can run.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("Image dimensions must be positive; got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Raw scale must be positive; got {0}")]
    InvalidScale(f64),
}

/// Errors from the input parsers.
///
/// Only structural problems land here; recoverable per-record issues are
/// reported as [`Diagnostic`]s instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Line {line}: expected {expected} columns, got {got}")]
    RowWidth {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("Line {line}: invalid {field} value {value:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Tabular read error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Record decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal pipeline failures.
///
/// Failure to *route* is never one of these; route queries return a
/// result-valued outcome instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Calibration record is unusable: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("Input could not be parsed: {0}")]
    Parse(#[from] ParseError),
    #[error("Cancelled")]
    Cancelled,
}

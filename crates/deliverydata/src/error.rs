//! Error types for delivery data conversion
//!
//! Errors are split by what went wrong:
//! - Structure (the plan is missing sequences, or counts do not line up)
//! - Values (non-numeric or physically implausible numbers)
//! - Configuration (bad tolerances, unreadable config files)

use std::path::PathBuf;

/// The RT Plan (or the delivery data relative to it) has the wrong shape
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    /// A required sequence is absent
    #[error("missing sequence {sequence}{}", beam_suffix(.beam))]
    MissingSequence {
        sequence: &'static str,
        beam: Option<usize>,
    },

    /// A required sequence is present but has no items
    #[error("sequence {sequence} has no items{}", beam_suffix(.beam))]
    EmptySequence {
        sequence: &'static str,
        beam: Option<usize>,
    },

    /// A required attribute is absent
    #[error("missing attribute {attribute}{}", point_suffix(.beam, .control_point))]
    MissingAttribute {
        attribute: &'static str,
        beam: usize,
        control_point: Option<usize>,
    },

    /// Delivery data entries do not line up with template control points
    #[error("control point count mismatch{}: template has {expected}, delivery data has {actual}", beam_suffix(.beam))]
    ControlPointCountMismatch {
        beam: Option<usize>,
        expected: usize,
        actual: usize,
    },

    /// No fraction group references the beam
    #[error("no beam meterset for beam number {beam_number}")]
    MissingBeamMeterset { beam_number: i64 },

    /// A delivery control point is within gantry tolerance of more than one beam
    #[error("delivery control point {index} at gantry {angle} is within reach of beams {first} and {second}")]
    AmbiguousBeamMatch {
        index: usize,
        first: usize,
        second: usize,
        angle: f64,
    },

    /// A delivery control point is not near any template beam
    #[error("delivery control point {index} at gantry {angle} is not within {tolerance} degrees of any beam")]
    NoBeamWithinTolerance {
        index: usize,
        angle: f64,
        tolerance: f64,
    },
}

fn beam_suffix(beam: &Option<usize>) -> String {
    beam.map(|beam| format!(" (beam {beam})")).unwrap_or_default()
}

fn point_suffix(beam: &usize, control_point: &Option<usize>) -> String {
    match control_point {
        Some(cp) => format!(" (beam {beam}, control point {cp})"),
        None => format!(" (beam {beam})"),
    }
}

/// A value is malformed or outside its physical range
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// Attribute text could not be parsed as a number
    #[error("{attribute} is not numeric: '{text}' ({location})")]
    NotNumeric {
        attribute: &'static str,
        text: String,
        location: String,
    },

    /// LeafJawPositions has the wrong number of values for its device
    #[error("{device} has {count} leaf/jaw positions ({location})")]
    MalformedPositions {
        device: String,
        count: usize,
        location: String,
    },

    /// NaN or infinite value in delivery data
    #[error("{field}[{index}] is not finite")]
    NonFinite { field: &'static str, index: usize },

    /// Angle outside [0, 360)
    #[error("{field}[{index}] = {value} is outside [0, 360)")]
    AngleOutOfRange {
        field: &'static str,
        index: usize,
        value: f64,
    },

    /// Delivery data fields have different lengths
    #[error("{field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Cumulative monitor units go backwards
    #[error("monitor units decrease at index {index}: {previous} -> {value}")]
    DecreasingMonitorUnits {
        index: usize,
        previous: f64,
        value: f64,
    },

    /// Number of leaf pairs differs from the template beam's MLC
    #[error("delivery control point {index} has {actual} leaf pairs, beam {beam} expects {expected}")]
    LeafCountMismatch {
        index: usize,
        beam: usize,
        expected: usize,
        actual: usize,
    },
}

/// Errors loading or validating [`ConversionConfig`](crate::ConversionConfig)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error during config read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A tolerance is negative or not finite
    #[error("invalid {field}: {value}")]
    InvalidTolerance { field: &'static str, value: f64 },
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Combined conversion error
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Plan structure problem
    #[error("structure error: {0}")]
    Structure(#[from] StructureError),

    /// Value problem
    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

/// Result type alias for conversion operations
pub type ConversionResult<T> = Result<T, ConversionError>;

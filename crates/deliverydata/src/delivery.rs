//! Flattened, beam-agnostic delivery data
//!
//! One entry per control point, concatenated over beams in plan order.

use crate::error::ValueError;
use serde::{Deserialize, Serialize};

/// Per-control-point delivery parameters
///
/// # Invariants
/// - Every field has one entry per control point (checked by [`validate`](Self::validate))
/// - `monitor_units` is cumulative over the whole plan, not per beam
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeliveryData {
    /// Cumulative monitor units
    pub monitor_units: Vec<f64>,
    /// Gantry angle in degrees
    pub gantry: Vec<f64>,
    /// Collimator (beam limiting device) angle in degrees
    pub collimator: Vec<f64>,
    /// MLC leaf pairs as `[bank A, bank B]`; empty when the beam has no MLC
    pub mlc: Vec<Vec<[f64; 2]>>,
    /// Y jaw pair
    pub jaw: Vec<[f64; 2]>,
    /// Source to surface distance, where recorded
    pub source_to_surface_distance: Vec<Option<f64>>,
}

impl DeliveryData {
    /// Create empty delivery data
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of control points
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.gantry.len()
    }

    /// True when there are no control points
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gantry.is_empty()
    }

    /// Append one control point
    pub fn push(&mut self, point: ControlPoint) {
        self.monitor_units.push(point.monitor_units);
        self.gantry.push(point.gantry);
        self.collimator.push(point.collimator);
        self.mlc.push(point.mlc);
        self.jaw.push(point.jaw);
        self.source_to_surface_distance
            .push(point.source_to_surface_distance);
    }

    /// Copy out control point `index`
    #[must_use]
    pub fn control_point(&self, index: usize) -> Option<ControlPoint> {
        Some(ControlPoint {
            monitor_units: *self.monitor_units.get(index)?,
            gantry: *self.gantry.get(index)?,
            collimator: *self.collimator.get(index)?,
            mlc: self.mlc.get(index)?.clone(),
            jaw: *self.jaw.get(index)?,
            source_to_surface_distance: *self.source_to_surface_distance.get(index)?,
        })
    }

    /// Select control points by index, in the order given
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut selected = Self::new();
        for point in indices.iter().filter_map(|&i| self.control_point(i)) {
            selected.push(point);
        }
        selected
    }

    /// Check field lengths, finiteness, angle ranges and MU monotonicity
    ///
    /// # Errors
    /// Returns the first violation found
    pub fn validate(&self) -> Result<(), ValueError> {
        let expected = self.gantry.len();
        for (field, actual) in [
            ("monitor_units", self.monitor_units.len()),
            ("collimator", self.collimator.len()),
            ("mlc", self.mlc.len()),
            ("jaw", self.jaw.len()),
            (
                "source_to_surface_distance",
                self.source_to_surface_distance.len(),
            ),
        ] {
            if actual != expected {
                return Err(ValueError::LengthMismatch {
                    field,
                    expected,
                    actual,
                });
            }
        }

        check_finite("monitor_units", self.monitor_units.iter().copied())?;
        for (index, pair) in self.jaw.iter().enumerate() {
            if pair.iter().any(|v| !v.is_finite()) {
                return Err(ValueError::NonFinite { field: "jaw", index });
            }
        }
        check_finite(
            "source_to_surface_distance",
            self.source_to_surface_distance
                .iter()
                .map(|ssd| ssd.unwrap_or(0.0)),
        )?;
        for (index, leaves) in self.mlc.iter().enumerate() {
            if leaves.iter().flatten().any(|v| !v.is_finite()) {
                return Err(ValueError::NonFinite { field: "mlc", index });
            }
        }

        check_angles("gantry", &self.gantry)?;
        check_angles("collimator", &self.collimator)?;

        for (index, pair) in self.monitor_units.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(ValueError::DecreasingMonitorUnits {
                    index: index + 1,
                    previous: pair[0],
                    value: pair[1],
                });
            }
        }
        Ok(())
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON
    ///
    /// # Errors
    /// Returns error if the JSON does not describe delivery data
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A single control point's delivery parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPoint {
    /// Cumulative monitor units
    pub monitor_units: f64,
    /// Gantry angle in degrees
    pub gantry: f64,
    /// Collimator angle in degrees
    pub collimator: f64,
    /// MLC leaf pairs
    pub mlc: Vec<[f64; 2]>,
    /// Y jaw pair
    pub jaw: [f64; 2],
    /// Source to surface distance
    pub source_to_surface_distance: Option<f64>,
}

fn check_finite(field: &'static str, values: impl Iterator<Item = f64>) -> Result<(), ValueError> {
    for (index, value) in values.enumerate() {
        if !value.is_finite() {
            return Err(ValueError::NonFinite { field, index });
        }
    }
    Ok(())
}

fn check_angles(field: &'static str, values: &[f64]) -> Result<(), ValueError> {
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(ValueError::NonFinite { field, index });
        }
        if !(0.0..360.0).contains(&value) {
            return Err(ValueError::AngleOutOfRange { field, index, value });
        }
    }
    Ok(())
}

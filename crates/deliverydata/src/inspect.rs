//! Read-only plan inspection
//!
//! The quantities compared when checking that a rebuilt plan still
//! matches its template, plus a per-beam summary for the command line.

use crate::error::ConversionResult;
use crate::plan::{
    at, beam_items, beam_metersets, beam_number, control_point_items, read_decimal, read_device_positions,
    text,
};
use crate::unique::maintain_order_unique;
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use serde::Serialize;
use std::fmt;

/// Number of control points in each beam
///
/// # Errors
/// Returns error if BeamSequence or a ControlPointSequence is missing or empty
pub fn num_of_control_points(plan: &InMemDicomObject) -> ConversionResult<Vec<usize>> {
    beam_items(plan)?
        .iter()
        .enumerate()
        .map(|(b, beam)| -> ConversionResult<usize> { Ok(control_point_items(beam, b)?.len()) })
        .collect()
}

/// Distinct SourceToSurfaceDistance values of each beam, in order of first appearance
///
/// # Errors
/// Returns error if the plan structure is missing or an SSD is not numeric
pub fn source_to_surface_distances(plan: &InMemDicomObject) -> ConversionResult<Vec<Vec<f64>>> {
    let mut per_beam = Vec::new();
    for (b, beam) in beam_items(plan)?.iter().enumerate() {
        let mut distances = Vec::new();
        for (i, point) in control_point_items(beam, b)?.iter().enumerate() {
            if let Some(ssd) = read_decimal(point, tags::SOURCE_TO_SURFACE_DISTANCE, "SourceToSurfaceDistance", || {
                at(b, i)
            })? {
                distances.push(ssd);
            }
        }
        per_beam.push(maintain_order_unique(&distances));
    }
    Ok(per_beam)
}

/// MLC LeafJawPositions at the first control point of each beam
///
/// Values are in DICOM order (bank A then bank B); a beam without an MLC
/// yields an empty list.
///
/// # Errors
/// Returns error if the plan structure is missing or positions are malformed
pub fn first_mlc_positions(plan: &InMemDicomObject) -> ConversionResult<Vec<Vec<f64>>> {
    beam_items(plan)?
        .iter()
        .enumerate()
        .map(|(b, beam)| -> ConversionResult<Vec<f64>> {
            let points = control_point_items(beam, b)?;
            let positions = read_device_positions(&points[0], b, 0)?;
            Ok(positions
                .mlc
                .map(|(_, leaves)| {
                    let bank_a = leaves.iter().map(|pair| pair[0]);
                    let bank_b = leaves.iter().map(|pair| pair[1]);
                    bank_a.chain(bank_b).collect()
                })
                .unwrap_or_default())
        })
        .collect()
}

/// One beam of a [`PlanSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamSummary {
    /// BeamNumber
    pub number: i64,
    /// BeamName, if present
    pub name: Option<String>,
    /// Control point count
    pub control_points: usize,
    /// Distinct explicit gantry angles
    pub gantry_angles: Vec<f64>,
    /// BeamMeterset from the first fraction group
    pub meterset: Option<f64>,
}

/// Overview of an RT Plan's beams
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    /// RTPlanLabel, if present
    pub label: Option<String>,
    /// Beams in plan order
    pub beams: Vec<BeamSummary>,
}

impl PlanSummary {
    /// Total control points over all beams
    #[must_use]
    pub fn total_control_points(&self) -> usize {
        self.beams.iter().map(|b| b.control_points).sum()
    }

    /// Sum of known beam metersets
    #[must_use]
    pub fn total_meterset(&self) -> f64 {
        self.beams.iter().filter_map(|b| b.meterset).sum()
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan: {}", self.label.as_deref().unwrap_or("(unlabelled)"))?;
        for beam in &self.beams {
            let angles: Vec<String> = beam.gantry_angles.iter().map(ToString::to_string).collect();
            writeln!(
                f,
                "  Beam {} {}: {} control points, gantry [{}], meterset {}",
                beam.number,
                beam.name.as_deref().unwrap_or("-"),
                beam.control_points,
                angles.join(", "),
                beam.meterset.map_or_else(|| "-".to_string(), |m| m.to_string()),
            )?;
        }
        write!(
            f,
            "Total: {} beams, {} control points, {} MU",
            self.beams.len(),
            self.total_control_points(),
            self.total_meterset()
        )
    }
}

/// Summarize the beams of a plan
///
/// # Errors
/// Returns error if the plan structure is missing or values are not numeric
pub fn summarize(plan: &InMemDicomObject) -> ConversionResult<PlanSummary> {
    let metersets = beam_metersets(plan)?;
    let mut beams = Vec::new();
    for (b, beam) in beam_items(plan)?.iter().enumerate() {
        let number = beam_number(beam, b)?;
        let points = control_point_items(beam, b)?;
        let mut angles = Vec::new();
        for (i, point) in points.iter().enumerate() {
            if let Some(angle) = read_decimal(point, tags::GANTRY_ANGLE, "GantryAngle", || at(b, i))? {
                angles.push(angle);
            }
        }
        beams.push(BeamSummary {
            number,
            name: text(beam, tags::BEAM_NAME).filter(|n| !n.is_empty()),
            control_points: points.len(),
            gantry_angles: maintain_order_unique(&angles),
            meterset: metersets.get(number),
        });
    }
    Ok(PlanSummary {
        label: text(plan, tags::RT_PLAN_LABEL).filter(|l| !l.is_empty()),
        beams,
    })
}

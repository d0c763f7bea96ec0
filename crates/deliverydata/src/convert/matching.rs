//! Assignment of delivery data control points to template beams

use crate::config::{BeamMatching, ConversionConfig};
use crate::delivery::DeliveryData;
use crate::error::StructureError;
use crate::plan::BeamLayout;

/// Indices into the delivery data, one list per template beam
pub(crate) type Assignment = Vec<Vec<usize>>;

pub(crate) fn assign(
    data: &DeliveryData,
    beams: &[BeamLayout],
    config: &ConversionConfig,
) -> Result<Assignment, StructureError> {
    match config.beam_matching {
        BeamMatching::Positional => positional(data.len(), beams),
        BeamMatching::NearestGantry => nearest_gantry(&data.gantry, beams, config),
    }
}

fn positional(total: usize, beams: &[BeamLayout]) -> Result<Assignment, StructureError> {
    let expected: usize = beams.iter().map(|b| b.control_points).sum();
    if expected != total {
        return Err(StructureError::ControlPointCountMismatch {
            beam: None,
            expected,
            actual: total,
        });
    }
    let mut next = 0;
    Ok(beams
        .iter()
        .map(|beam| {
            let indices: Vec<usize> = (next..next + beam.control_points).collect();
            next += beam.control_points;
            indices
        })
        .collect())
}

/// Distance between two angles on the circle, in degrees
pub(crate) fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Distance from `angle` to the gantry positions a beam covers
///
/// Consecutive explicit angles bound a segment of travel, taken the short
/// way round; a static beam covers its single angle.
pub(crate) fn beam_distance(angle: f64, beam: &BeamLayout) -> f64 {
    let nearest_point = beam
        .angles
        .iter()
        .map(|&a| angular_distance(angle, a))
        .fold(f64::INFINITY, f64::min);
    let on_segment = beam.angles.windows(2).any(|pair| {
        let span = angular_distance(pair[0], pair[1]);
        angular_distance(pair[0], angle) + angular_distance(angle, pair[1]) <= span + 1e-9
    });
    if on_segment {
        0.0
    } else {
        nearest_point
    }
}

fn nearest_gantry(
    gantry: &[f64],
    beams: &[BeamLayout],
    config: &ConversionConfig,
) -> Result<Assignment, StructureError> {
    let mut assignment: Assignment = vec![Vec::new(); beams.len()];
    for (index, &angle) in gantry.iter().enumerate() {
        let mut reachable = beams
            .iter()
            .enumerate()
            .filter(|(_, beam)| beam_distance(angle, beam) <= config.gantry_tolerance)
            .map(|(b, _)| b);
        match (reachable.next(), reachable.next()) {
            (Some(b), None) => assignment[b].push(index),
            (Some(first), Some(second)) => {
                return Err(StructureError::AmbiguousBeamMatch {
                    index,
                    first,
                    second,
                    angle,
                })
            }
            (None, _) => {
                return Err(StructureError::NoBeamWithinTolerance {
                    index,
                    angle,
                    tolerance: config.gantry_tolerance,
                })
            }
        }
    }

    for (b, (indices, beam)) in assignment.iter().zip(beams).enumerate() {
        if indices.len() != beam.control_points {
            return Err(StructureError::ControlPointCountMismatch {
                beam: Some(b),
                expected: beam.control_points,
                actual: indices.len(),
            });
        }
    }
    Ok(assignment)
}

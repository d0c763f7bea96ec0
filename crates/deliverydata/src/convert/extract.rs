//! RT Plan → delivery data

use crate::delivery::{ControlPoint, DeliveryData};
use crate::error::ConversionResult;
use crate::plan::{
    at, beam_items, beam_metersets, beam_number, beam_states, control_point_items, final_weight,
    read_decimal,
};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;

pub(crate) fn extract(plan: &InMemDicomObject) -> ConversionResult<DeliveryData> {
    let beams = beam_items(plan)?;
    let metersets = beam_metersets(plan)?;
    let mut data = DeliveryData::new();
    let mut offset = 0.0;

    for (b, beam) in beams.iter().enumerate() {
        let meterset = metersets.delivered(beam_number(beam, b)?)?;
        let states = beam_states(beam, b)?;
        let final_weight = final_weight(beam, b, &states)?;
        tracing::debug!(
            "Beam {}: {} control points, meterset {}",
            b,
            states.len(),
            meterset
        );

        for state in states {
            // weight / final is exactly 1.0 at the end of a beam, so the next
            // beam starts exactly where this one stops
            let fraction = if final_weight > 0.0 {
                state.meterset_weight / final_weight
            } else {
                0.0
            };
            data.push(ControlPoint {
                monitor_units: offset + meterset * fraction,
                gantry: state.gantry,
                collimator: state.collimator,
                mlc: state.mlc,
                jaw: state.jaw,
                source_to_surface_distance: state.ssd,
            });
        }
        offset += meterset;
    }

    tracing::info!(
        "Extracted {} control points from {} beams ({} MU)",
        data.len(),
        beams.len(),
        offset
    );
    Ok(data)
}

pub(crate) fn gantry_angles(plan: &InMemDicomObject) -> ConversionResult<Vec<f64>> {
    let mut angles = Vec::new();
    for (b, beam) in beam_items(plan)?.iter().enumerate() {
        for (i, point) in control_point_items(beam, b)?.iter().enumerate() {
            if let Some(angle) = read_decimal(point, tags::GANTRY_ANGLE, "GantryAngle", || at(b, i))? {
                angles.push(angle);
            }
        }
    }
    Ok(angles)
}

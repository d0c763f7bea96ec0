//! Delivery data + template RT Plan → new RT Plan
//!
//! A value is written only when it differs (beyond `value_tolerance`) from
//! what the template control point already carries or inherits. Everything
//! else, including absent attributes and original text encodings, is left
//! exactly as the template has it.

use crate::config::ConversionConfig;
use crate::convert::matching::assign;
use crate::delivery::DeliveryData;
use crate::error::{ConversionResult, StructureError, ValueError};
use crate::plan::{
    at, beam_layouts, beam_metersets, beam_number, beam_states, decimal_element, decimals_element,
    final_weight, items, read_decimal, read_device_positions, reseal,
    sequence_element, text, text_element, update_sequence, ControlPointState, DeviceKind,
    DevicePositions, Items, Metersets,
};
use dicom::core::{Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use std::collections::HashMap;

pub(crate) fn rebuild(
    data: &DeliveryData,
    template: &InMemDicomObject,
    config: &ConversionConfig,
) -> ConversionResult<InMemDicomObject> {
    data.validate()?;
    let layouts = beam_layouts(template)?;
    let assignment = assign(data, &layouts, config)?;
    let metersets = beam_metersets(template)?;

    let mut plan = template.clone();
    let mut rewritten: HashMap<i64, f64> = HashMap::new();

    update_sequence(&mut plan, tags::BEAM_SEQUENCE, "BeamSequence", None, |beams| {
        let mut changed = false;
        for (b, (beam, indices)) in beams.iter_mut().zip(&assignment).enumerate() {
            let writer = BeamWriter {
                data,
                beam_index: b,
                indices,
                tolerance: config.value_tolerance,
            };
            let outcome = writer.write(beam, &metersets)?;
            if let Some(meterset) = outcome.new_meterset {
                rewritten.insert(outcome.beam_number, meterset);
            }
            changed |= outcome.changed;
        }
        Ok(((), changed))
    })?;

    if !rewritten.is_empty() {
        rewrite_metersets(&mut plan, &rewritten)?;
    }

    tracing::info!(
        "Rebuilt plan with {} beams from {} control points",
        layouts.len(),
        data.len()
    );
    Ok(plan)
}

/// Relative comparison with an absolute floor of `tolerance` near zero
pub(crate) fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
}

fn pairs_eq<const N: usize>(a: &[[f64; N]], b: &[[f64; N]], tolerance: f64) -> bool {
    a.len() == b.len()
        && a.iter()
            .flatten()
            .zip(b.iter().flatten())
            .all(|(x, y)| approx_eq(*x, *y, tolerance))
}

/// Put `desired` at `tag` unless `current` already matches it
///
/// Returns the value now in effect and whether the control point changed.
fn sync_decimal(
    point: &mut InMemDicomObject,
    tag: Tag,
    desired: f64,
    current: Option<f64>,
    tolerance: f64,
) -> (f64, bool) {
    match current {
        Some(value) if approx_eq(value, desired, tolerance) => (value, false),
        _ => {
            point.put(decimal_element(tag, desired));
            (desired, true)
        }
    }
}

struct BeamOutcome {
    beam_number: i64,
    new_meterset: Option<f64>,
    changed: bool,
}

/// Values in effect at the previous output control point
#[derive(Default)]
struct Carried {
    gantry: Option<f64>,
    collimator: Option<f64>,
    mlc: Option<Vec<[f64; 2]>>,
    jaw: Option<[f64; 2]>,
}

/// Device type names used when a control point needs a new position item
#[derive(Default)]
struct DeviceTypes {
    mlc: Option<String>,
    jaw: Option<String>,
}

struct BeamWriter<'a> {
    data: &'a DeliveryData,
    beam_index: usize,
    indices: &'a [usize],
    tolerance: f64,
}

impl BeamWriter<'_> {
    fn write(
        &self,
        beam: &mut InMemDicomObject,
        metersets: &Metersets,
    ) -> ConversionResult<BeamOutcome> {
        let b = self.beam_index;
        let number = beam_number(beam, b)?;
        let template_meterset = metersets.delivered(number)?;
        let states = beam_states(beam, b)?;
        let final_weight = final_weight(beam, b, &states)?;
        let device_types = device_types(beam, b)?;

        let (Some(&first), Some(&last)) = (self.indices.first(), self.indices.last()) else {
            return Ok(BeamOutcome {
                beam_number: number,
                new_meterset: None,
                changed: false,
            });
        };
        let mu = &self.data.monitor_units;
        let start = if first == 0 { 0.0 } else { mu[first - 1] };
        let beam_mu = mu[last] - start;
        let rescale = !approx_eq(beam_mu, 0.0, self.tolerance);
        let new_meterset = (!approx_eq(beam_mu, template_meterset, self.tolerance)).then_some(beam_mu);
        if new_meterset.is_some() && !metersets.references(number) {
            return Err(StructureError::MissingBeamMeterset { beam_number: number }.into());
        }
        if let Some(meterset) = new_meterset {
            tracing::warn!(
                "Beam {} meterset changes from {} to {}",
                number,
                template_meterset,
                meterset
            );
        }

        let weights: Vec<f64> = self
            .indices
            .iter()
            .zip(&states)
            .map(|(&k, state)| {
                if rescale {
                    (mu[k] - start) / beam_mu * final_weight
                } else {
                    state.meterset_weight
                }
            })
            .collect();

        let changed = update_sequence(
            beam,
            tags::CONTROL_POINT_SEQUENCE,
            "ControlPointSequence",
            Some(b),
            |points| {
                if points.len() != self.indices.len() {
                    return Err(StructureError::ControlPointCountMismatch {
                        beam: Some(b),
                        expected: points.len(),
                        actual: self.indices.len(),
                    }
                    .into());
                }
                let mut carried = Carried::default();
                let mut changed = false;
                for (i, point) in points.iter_mut().enumerate() {
                    let k = self.indices[i];
                    let point_changed = self.write_point(
                        point,
                        i,
                        k,
                        weights[i],
                        &states[i],
                        &device_types,
                        &mut carried,
                    )?;
                    if point_changed {
                        reseal(point);
                    }
                    changed |= point_changed;
                }
                Ok((changed, changed))
            },
        )?;

        tracing::debug!("Beam {}: control points changed = {}", b, changed);
        Ok(BeamOutcome {
            beam_number: number,
            new_meterset,
            changed,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_point(
        &self,
        point: &mut InMemDicomObject,
        i: usize,
        k: usize,
        weight: f64,
        state: &ControlPointState,
        device_types: &DeviceTypes,
        carried: &mut Carried,
    ) -> ConversionResult<bool> {
        let b = self.beam_index;
        let tolerance = self.tolerance;
        let data = self.data;
        let location = || at(b, i);
        let mut changed = false;

        let (_, c) = sync_decimal(
            point,
            tags::CUMULATIVE_METERSET_WEIGHT,
            weight,
            Some(state.meterset_weight),
            tolerance,
        );
        changed |= c;

        let explicit = read_decimal(point, tags::GANTRY_ANGLE, "GantryAngle", location)?;
        let (value, c) = sync_decimal(
            point,
            tags::GANTRY_ANGLE,
            data.gantry[k],
            explicit.or(carried.gantry),
            tolerance,
        );
        carried.gantry = Some(value);
        changed |= c;

        let explicit = read_decimal(point, tags::BEAM_LIMITING_DEVICE_ANGLE, "BeamLimitingDeviceAngle", location)?;
        let (value, c) = sync_decimal(
            point,
            tags::BEAM_LIMITING_DEVICE_ANGLE,
            data.collimator[k],
            explicit.or(carried.collimator),
            tolerance,
        );
        carried.collimator = Some(value);
        changed |= c;

        changed |= match (data.source_to_surface_distance[k], state.ssd) {
            (Some(desired), current) => {
                sync_decimal(point, tags::SOURCE_TO_SURFACE_DISTANCE, desired, current, tolerance).1
            }
            (None, Some(_)) => point.remove_element(tags::SOURCE_TO_SURFACE_DISTANCE),
            (None, None) => false,
        };

        changed |= self.write_devices(point, i, k, state, device_types, carried)?;
        Ok(changed)
    }

    fn write_devices(
        &self,
        point: &mut InMemDicomObject,
        i: usize,
        k: usize,
        state: &ControlPointState,
        device_types: &DeviceTypes,
        carried: &mut Carried,
    ) -> ConversionResult<bool> {
        let b = self.beam_index;
        let desired_mlc = &self.data.mlc[k];
        let desired_jaw = self.data.jaw[k];

        if desired_mlc.len() != state.mlc.len() {
            return Err(ValueError::LeafCountMismatch {
                index: k,
                beam: b,
                expected: state.mlc.len(),
                actual: desired_mlc.len(),
            }
            .into());
        }

        let explicit: DevicePositions = read_device_positions(point, b, i)?;
        let current_mlc = explicit.mlc.map(|(_, leaves)| leaves).or_else(|| carried.mlc.clone());
        let current_jaw = explicit.jaw.map(|(_, jaw)| jaw).or(carried.jaw);

        let write_mlc = match &current_mlc {
            Some(current) => !pairs_eq(current, desired_mlc, self.tolerance),
            None => !desired_mlc.is_empty(),
        };
        let write_jaw = match &current_jaw {
            Some(current) => !pairs_eq(&[*current], &[desired_jaw], self.tolerance),
            None => true,
        };

        carried.mlc = Some(if write_mlc { desired_mlc.clone() } else { current_mlc.unwrap_or_default() });
        carried.jaw = Some(if write_jaw { desired_jaw } else { current_jaw.unwrap_or(desired_jaw) });

        if !write_mlc && !write_jaw {
            return Ok(false);
        }

        let mlc_values: Vec<f64> = desired_mlc
            .iter()
            .map(|pair| pair[0])
            .chain(desired_mlc.iter().map(|pair| pair[1]))
            .collect();
        let jaw_values = [desired_jaw[0], desired_jaw[1]];
        let mut pending: Vec<(DeviceKind, &[f64])> = Vec::new();
        if write_mlc {
            pending.push((DeviceKind::Mlc, mlc_values.as_slice()));
        }
        if write_jaw {
            pending.push((DeviceKind::Jaw, jaw_values.as_slice()));
        }

        let mut place = |devices: &mut Items| -> ConversionResult<()> {
            for device in devices.iter_mut() {
                let Some(device_type) = text(device, tags::RT_BEAM_LIMITING_DEVICE_TYPE) else {
                    continue;
                };
                let kind = DeviceKind::classify(&device_type);
                if let Some(pos) = pending.iter().position(|(k, _)| *k == kind) {
                    let (_, values) = pending.remove(pos);
                    device.put(decimals_element(tags::LEAF_JAW_POSITIONS, values));
                    reseal(device);
                }
            }
            for (kind, values) in pending.drain(..) {
                let device_type = match kind {
                    DeviceKind::Mlc => device_types.mlc.as_deref(),
                    DeviceKind::Jaw => device_types.jaw.as_deref(),
                    DeviceKind::Other => None,
                };
                let device_type = device_type.ok_or(StructureError::MissingAttribute {
                    attribute: "RTBeamLimitingDeviceType",
                    beam: b,
                    control_point: Some(0),
                })?;
                devices.push(InMemDicomObject::from_element_iter([
                    text_element(tags::RT_BEAM_LIMITING_DEVICE_TYPE, VR::CS, device_type),
                    decimals_element(tags::LEAF_JAW_POSITIONS, values),
                ]));
            }
            Ok(())
        };

        if items(point, tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE).is_some() {
            update_sequence(
                point,
                tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE,
                "BeamLimitingDevicePositionSequence",
                Some(b),
                |devices| place(devices).map(|()| ((), true)),
            )?;
        } else {
            let mut devices = Items::new();
            place(&mut devices)?;
            point.put(sequence_element(
                tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE,
                devices,
            ));
        }
        Ok(true)
    }
}

/// MLC and Y jaw device type names from a beam's first control point
fn device_types(beam: &InMemDicomObject, b: usize) -> ConversionResult<DeviceTypes> {
    let Some(first) = items(beam, tags::CONTROL_POINT_SEQUENCE).and_then(<[_]>::first) else {
        return Ok(DeviceTypes::default());
    };
    let positions = read_device_positions(first, b, 0)?;
    Ok(DeviceTypes {
        mlc: positions.mlc.map(|(name, _)| name),
        jaw: positions.jaw.map(|(name, _)| name),
    })
}

/// Write new BeamMeterset values into the first fraction group
fn rewrite_metersets(plan: &mut InMemDicomObject, metersets: &HashMap<i64, f64>) -> ConversionResult<()> {
    update_sequence(
        plan,
        tags::FRACTION_GROUP_SEQUENCE,
        "FractionGroupSequence",
        None,
        |groups| {
            let Some(group) = groups.first_mut() else {
                return Ok(((), false));
            };
            update_sequence(
                group,
                tags::REFERENCED_BEAM_SEQUENCE,
                "ReferencedBeamSequence",
                None,
                |references| {
                    let mut changed = false;
                    for (i, reference) in references.iter_mut().enumerate() {
                        let number = read_decimal(reference, tags::REFERENCED_BEAM_NUMBER, "ReferencedBeamNumber", || {
                            format!("fraction group 0, referenced beam {i}")
                        })?;
                        #[allow(clippy::cast_possible_truncation)]
                        let Some(&meterset) = number.and_then(|n| metersets.get(&(n.round() as i64))) else {
                            continue;
                        };
                        reference.put(decimal_element(tags::BEAM_METERSET, meterset));
                        reseal(reference);
                        changed = true;
                    }
                    Ok(((), changed))
                },
            )?;
            reseal(group);
            Ok(((), true))
        },
    )
}

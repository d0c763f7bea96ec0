//! RT Plan access layer
//!
//! Reads beams, control points and fraction-group metersets out of an
//! in-memory DICOM object, applying control point inheritance: an
//! attribute absent from a control point keeps the value it had at the
//! previous control point of the same beam.
//!
//! Also holds the element constructors and sequence editing used when a
//! plan is rebuilt from delivery data.

use crate::error::{ConversionError, ConversionResult, StructureError, ValueError};
use dicom::core::header::HasLength;
use dicom::core::value::{DataSetSequence, PrimitiveValue, Value};
use dicom::core::{DataElement, Length, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Items of a DICOM sequence, as stored by dicom-rs
pub type Items = SmallVec<[InMemDicomObject; 2]>;

/// Maximum length of a DS (decimal string) value
const DS_MAX_LEN: usize = 16;

/// Beam limiting device roles relevant to delivery data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceKind {
    Mlc,
    Jaw,
    Other,
}

impl DeviceKind {
    pub(crate) fn classify(device_type: &str) -> Self {
        match device_type {
            "MLCX" | "MLCY" => Self::Mlc,
            "ASYMY" | "Y" => Self::Jaw,
            _ => Self::Other,
        }
    }
}

/// Explicit device positions found on one control point
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DevicePositions {
    pub(crate) mlc: Option<(String, Vec<[f64; 2]>)>,
    pub(crate) jaw: Option<(String, [f64; 2])>,
}

/// Effective (inherited) state of a control point
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ControlPointState {
    pub(crate) meterset_weight: f64,
    pub(crate) gantry: f64,
    /// Gantry angle only if this control point states it
    pub(crate) explicit_gantry: Option<f64>,
    pub(crate) collimator: f64,
    pub(crate) ssd: Option<f64>,
    pub(crate) mlc: Vec<[f64; 2]>,
    pub(crate) jaw: [f64; 2],
}

/// Shape of a template beam, as needed for beam matching
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BeamLayout {
    pub(crate) control_points: usize,
    /// Explicit gantry angles in control point order; one for a static beam
    pub(crate) angles: Vec<f64>,
}

pub(crate) fn at(beam: usize, control_point: usize) -> String {
    format!("beam {beam}, control point {control_point}")
}

/// Items of the sequence at `tag`, if present
#[must_use]
pub fn items(obj: &InMemDicomObject, tag: Tag) -> Option<&[InMemDicomObject]> {
    obj.element(tag).ok()?.items()
}

/// Trimmed string value at `tag`, if present
#[must_use]
pub fn text(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = obj.element(tag).ok()?;
    let value = element.to_str().ok()?;
    Some(value.trim_matches(|c: char| c == ' ' || c == '\0').to_string())
}

/// Beams of the plan; fails if BeamSequence is absent or empty
pub(crate) fn beam_items(plan: &InMemDicomObject) -> Result<&[InMemDicomObject], StructureError> {
    let beams = items(plan, tags::BEAM_SEQUENCE).ok_or(StructureError::MissingSequence {
        sequence: "BeamSequence",
        beam: None,
    })?;
    if beams.is_empty() {
        return Err(StructureError::EmptySequence {
            sequence: "BeamSequence",
            beam: None,
        });
    }
    Ok(beams)
}

/// Control points of a beam; fails if ControlPointSequence is absent or empty
pub(crate) fn control_point_items(
    beam: &InMemDicomObject,
    beam_index: usize,
) -> Result<&[InMemDicomObject], StructureError> {
    let points = items(beam, tags::CONTROL_POINT_SEQUENCE).ok_or(
        StructureError::MissingSequence {
            sequence: "ControlPointSequence",
            beam: Some(beam_index),
        },
    )?;
    if points.is_empty() {
        return Err(StructureError::EmptySequence {
            sequence: "ControlPointSequence",
            beam: Some(beam_index),
        });
    }
    Ok(points)
}

fn parse_decimals(text: &str) -> Option<Vec<f64>> {
    text.split('\\')
        .map(|part| part.trim_matches(|c: char| c == ' ' || c == '\0').parse::<f64>().ok())
        .collect()
}

/// All numeric values at `tag`; `None` when absent or empty
pub(crate) fn read_decimals(
    obj: &InMemDicomObject,
    tag: Tag,
    attribute: &'static str,
    location: impl FnOnce() -> String,
) -> Result<Option<Vec<f64>>, ValueError> {
    let Some(value) = text(obj, tag) else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }
    parse_decimals(&value)
        .map(Some)
        .ok_or_else(|| ValueError::NotNumeric {
            attribute,
            text: value,
            location: location(),
        })
}

/// First numeric value at `tag`; `None` when absent or empty
pub(crate) fn read_decimal(
    obj: &InMemDicomObject,
    tag: Tag,
    attribute: &'static str,
    location: impl FnOnce() -> String,
) -> Result<Option<f64>, ValueError> {
    Ok(read_decimals(obj, tag, attribute, location)?.and_then(|values| values.first().copied()))
}

/// BeamNumber of a beam item
pub(crate) fn beam_number(beam: &InMemDicomObject, beam_index: usize) -> ConversionResult<i64> {
    let value = text(beam, tags::BEAM_NUMBER)
        .filter(|v| !v.is_empty())
        .ok_or(StructureError::MissingAttribute {
            attribute: "BeamNumber",
            beam: beam_index,
            control_point: None,
        })?;
    value.parse::<i64>().map_err(|_| {
        ValueError::NotNumeric {
            attribute: "BeamNumber",
            text: value.clone(),
            location: format!("beam {beam_index}"),
        }
        .into()
    })
}

/// BeamMeterset by ReferencedBeamNumber, from the first fraction group
///
/// A beam the fraction group does not reference (a setup or imaging field)
/// delivers no monitor units. A referenced beam without a BeamMeterset is an
/// error.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Metersets(HashMap<i64, Option<f64>>);

impl Metersets {
    /// Stated meterset of a beam, if any
    pub(crate) fn get(&self, beam_number: i64) -> Option<f64> {
        self.0.get(&beam_number).copied().flatten()
    }

    /// Meterset delivered by a beam; zero when the beam is not referenced
    pub(crate) fn delivered(&self, beam_number: i64) -> Result<f64, StructureError> {
        match self.0.get(&beam_number) {
            Some(Some(meterset)) => Ok(*meterset),
            Some(None) => Err(StructureError::MissingBeamMeterset { beam_number }),
            None => Ok(0.0),
        }
    }

    pub(crate) fn references(&self, beam_number: i64) -> bool {
        self.0.contains_key(&beam_number)
    }
}

pub(crate) fn beam_metersets(plan: &InMemDicomObject) -> ConversionResult<Metersets> {
    let mut metersets = HashMap::new();
    let Some(group) = items(plan, tags::FRACTION_GROUP_SEQUENCE).and_then(<[_]>::first) else {
        return Ok(Metersets(metersets));
    };
    for (i, reference) in items(group, tags::REFERENCED_BEAM_SEQUENCE)
        .unwrap_or_default()
        .iter()
        .enumerate()
    {
        let location = || format!("fraction group 0, referenced beam {i}");
        let Some(number) = read_decimal(reference, tags::REFERENCED_BEAM_NUMBER, "ReferencedBeamNumber", location)? else {
            continue;
        };
        let meterset = read_decimal(reference, tags::BEAM_METERSET, "BeamMeterset", location)?;
        #[allow(clippy::cast_possible_truncation)]
        metersets.insert(number.round() as i64, meterset);
    }
    Ok(Metersets(metersets))
}

/// LeafJawPositions of MLC and Y jaw devices on one control point
pub(crate) fn read_device_positions(
    point: &InMemDicomObject,
    beam_index: usize,
    cp_index: usize,
) -> Result<DevicePositions, ValueError> {
    let mut positions = DevicePositions::default();
    let Some(devices) = items(point, tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE) else {
        return Ok(positions);
    };
    for device in devices {
        let Some(device_type) = text(device, tags::RT_BEAM_LIMITING_DEVICE_TYPE) else {
            continue;
        };
        let kind = DeviceKind::classify(&device_type);
        if kind == DeviceKind::Other {
            continue;
        }
        let values = read_decimals(device, tags::LEAF_JAW_POSITIONS, "LeafJawPositions", || {
            at(beam_index, cp_index)
        })?
        .unwrap_or_default();
        let malformed = || ValueError::MalformedPositions {
            device: device_type.clone(),
            count: values.len(),
            location: at(beam_index, cp_index),
        };
        match kind {
            DeviceKind::Mlc => {
                if values.is_empty() || values.len() % 2 != 0 {
                    return Err(malformed());
                }
                let pairs = values.len() / 2;
                let leaves = (0..pairs).map(|i| [values[i], values[pairs + i]]).collect();
                positions.mlc = Some((device_type.clone(), leaves));
            }
            DeviceKind::Jaw => {
                if values.len() != 2 {
                    return Err(malformed());
                }
                positions.jaw = Some((device_type.clone(), [values[0], values[1]]));
            }
            DeviceKind::Other => {}
        }
    }
    Ok(positions)
}

/// Walk a beam's control points, resolving inherited values
pub(crate) fn beam_states(
    beam: &InMemDicomObject,
    beam_index: usize,
) -> ConversionResult<Vec<ControlPointState>> {
    let points = control_point_items(beam, beam_index)?;
    let mut states: Vec<ControlPointState> = Vec::with_capacity(points.len());

    for (i, point) in points.iter().enumerate() {
        let location = || at(beam_index, i);
        let previous = states.last();
        let missing = |attribute| StructureError::MissingAttribute {
            attribute,
            beam: beam_index,
            control_point: Some(i),
        };

        let meterset_weight = read_decimal(point, tags::CUMULATIVE_METERSET_WEIGHT, "CumulativeMetersetWeight", location)?
            .ok_or_else(|| missing("CumulativeMetersetWeight"))?;

        let explicit_gantry = read_decimal(point, tags::GANTRY_ANGLE, "GantryAngle", location)?;
        let gantry = explicit_gantry
            .or(previous.map(|s| s.gantry))
            .ok_or_else(|| missing("GantryAngle"))?;

        let collimator = read_decimal(point, tags::BEAM_LIMITING_DEVICE_ANGLE, "BeamLimitingDeviceAngle", location)?
            .or(previous.map(|s| s.collimator))
            .ok_or_else(|| missing("BeamLimitingDeviceAngle"))?;

        let ssd = read_decimal(point, tags::SOURCE_TO_SURFACE_DISTANCE, "SourceToSurfaceDistance", location)?;

        let devices = read_device_positions(point, beam_index, i)?;
        let mlc = match (devices.mlc, previous) {
            (Some((_, leaves)), _) => leaves,
            (None, Some(prev)) => prev.mlc.clone(),
            (None, None) => Vec::new(),
        };
        let jaw = devices
            .jaw
            .map(|(_, jaw)| jaw)
            .or(previous.map(|s| s.jaw))
            .ok_or_else(|| missing("LeafJawPositions (Y jaw)"))?;

        states.push(ControlPointState {
            meterset_weight,
            gantry,
            explicit_gantry,
            collimator,
            ssd,
            mlc,
            jaw,
        });
    }
    Ok(states)
}

/// FinalCumulativeMetersetWeight, falling back to the last control point's weight
pub(crate) fn final_weight(
    beam: &InMemDicomObject,
    beam_index: usize,
    states: &[ControlPointState],
) -> ConversionResult<f64> {
    let stated = read_decimal(beam, tags::FINAL_CUMULATIVE_METERSET_WEIGHT, "FinalCumulativeMetersetWeight", || {
        format!("beam {beam_index}")
    })?;
    Ok(stated
        .or_else(|| states.last().map(|s| s.meterset_weight))
        .unwrap_or(0.0))
}

/// Control point count and explicit gantry angles of every beam
pub(crate) fn beam_layouts(plan: &InMemDicomObject) -> ConversionResult<Vec<BeamLayout>> {
    beam_items(plan)?
        .iter()
        .enumerate()
        .map(|(b, beam)| -> ConversionResult<BeamLayout> {
            let points = control_point_items(beam, b)?;
            let mut angles = Vec::new();
            for (i, point) in points.iter().enumerate() {
                if let Some(angle) = read_decimal(point, tags::GANTRY_ANGLE, "GantryAngle", || at(b, i))? {
                    angles.push(angle);
                } else if i == 0 {
                    return Err(StructureError::MissingAttribute {
                        attribute: "GantryAngle",
                        beam: b,
                        control_point: Some(0),
                    }
                    .into());
                }
            }
            Ok(BeamLayout {
                control_points: points.len(),
                angles,
            })
        })
        .collect()
}

/// Format a number as a DICOM decimal string (at most 16 characters)
#[must_use]
pub fn format_decimal_string(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let plain = format!("{value}");
    if plain.len() <= DS_MAX_LEN {
        return plain;
    }
    for precision in (0..DS_MAX_LEN).rev() {
        let fixed = format!("{value:.precision$}");
        let fixed = if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        };
        if fixed.len() <= DS_MAX_LEN {
            return fixed;
        }
    }
    for precision in (0..10).rev() {
        let scientific = format!("{value:.precision$e}");
        if scientific.len() <= DS_MAX_LEN {
            return scientific;
        }
    }
    format!("{value:e}")
}

/// Single-valued DS element
#[must_use]
pub fn decimal_element(tag: Tag, value: f64) -> InMemElement {
    DataElement::new(tag, VR::DS, PrimitiveValue::from(format_decimal_string(value)))
}

/// Multi-valued DS element
#[must_use]
pub fn decimals_element(tag: Tag, values: &[f64]) -> InMemElement {
    DataElement::new(
        tag,
        VR::DS,
        PrimitiveValue::Strs(values.iter().map(|&v| format_decimal_string(v)).collect()),
    )
}

/// String element of any text VR
#[must_use]
pub fn text_element(tag: Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

/// Sequence element with undefined length
#[must_use]
pub fn sequence_element(tag: Tag, items: impl Into<Items>) -> InMemElement {
    sequence_with_length(tag, items.into(), Length::UNDEFINED)
}

fn sequence_with_length(tag: Tag, items: Items, length: Length) -> InMemElement {
    DataElement::new(tag, VR::SQ, Value::Sequence(DataSetSequence::new(items, length)))
}

/// Edit the items of the sequence at `tag` in place
///
/// `edit` returns its result and whether anything changed. An unchanged
/// sequence keeps its original length; a changed one gets an undefined
/// length so stale byte counts are never written out.
pub(crate) fn update_sequence<T>(
    obj: &mut InMemDicomObject,
    tag: Tag,
    sequence: &'static str,
    beam: Option<usize>,
    edit: impl FnOnce(&mut Items) -> ConversionResult<(T, bool)>,
) -> ConversionResult<T> {
    let missing = || ConversionError::from(StructureError::MissingSequence { sequence, beam });
    let element = obj.take_element(tag).map_err(|_| missing())?;
    let length = element.length();
    let mut items = match element.into_value() {
        Value::Sequence(sequence) => sequence.into_items(),
        _ => return Err(missing()),
    };
    let (result, changed) = edit(&mut items)?;
    let length = if changed { Length::UNDEFINED } else { length };
    obj.put(sequence_with_length(tag, items, length));
    Ok(result)
}

/// Rebuild an edited item so it carries no stale explicit item length
pub(crate) fn reseal(item: &mut InMemDicomObject) {
    let edited = std::mem::replace(item, InMemDicomObject::new_empty());
    *item = InMemDicomObject::from_element_iter(edited);
}

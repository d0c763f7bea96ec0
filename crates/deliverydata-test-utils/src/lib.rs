//! Testing utilities for the deliverydata workspace
//!
//! Synthetic RT Plan fixtures. Values are written with their own text
//! formatting (for example `"90.0"`), so tests can tell whether a
//! rebuilt plan kept the template's encoding.

#![allow(missing_docs)]

use dicom::core::value::{DataSetSequence, PrimitiveValue, Value};
use dicom::core::{DataElement, Length, Tag, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use std::path::{Path, PathBuf};

pub const STUDY_UID: &str = "1.2.826.0.1.3680043.8.498.10";
pub const SERIES_UID: &str = "1.2.826.0.1.3680043.8.498.11";
pub const PLAN_UID: &str = "1.2.826.0.1.3680043.8.498.12";

/// One beam of a synthetic plan
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSpec {
    pub number: i64,
    pub name: String,
    pub gantry: f64,
    /// Signed gantry travel in degrees; `None` for a static beam
    pub arc: Option<f64>,
    pub collimator: f64,
    pub control_points: usize,
    pub meterset: f64,
    pub ssd: f64,
    pub leaf_pairs: usize,
    pub jaw: [f64; 2],
    /// Setup field, left out of the fraction group
    pub setup: bool,
}

impl BeamSpec {
    pub fn new(number: i64, gantry: f64) -> Self {
        Self {
            number,
            name: format!("Field {number}"),
            gantry,
            arc: None,
            collimator: 0.0,
            control_points: 2,
            meterset: 100.0,
            ssd: 950.0,
            leaf_pairs: 4,
            jaw: [-100.0, 100.0],
            setup: false,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn arc(mut self, degrees: f64) -> Self {
        self.arc = Some(degrees);
        self
    }

    pub fn collimator(mut self, degrees: f64) -> Self {
        self.collimator = degrees;
        self
    }

    pub fn control_points(mut self, count: usize) -> Self {
        self.control_points = count.max(2);
        self
    }

    pub fn meterset(mut self, mu: f64) -> Self {
        self.meterset = mu;
        self
    }

    pub fn ssd(mut self, mm: f64) -> Self {
        self.ssd = mm;
        self
    }

    pub fn leaf_pairs(mut self, count: usize) -> Self {
        self.leaf_pairs = count;
        self
    }

    pub fn jaw(mut self, jaw: [f64; 2]) -> Self {
        self.jaw = jaw;
        self
    }

    pub fn setup(mut self) -> Self {
        self.setup = true;
        self
    }

    /// Gantry angle at control point `i`, rounded to 0.1 degree
    pub fn gantry_at(&self, i: usize) -> f64 {
        let span = self.arc.unwrap_or(0.0);
        let t = i as f64 / (self.control_points - 1) as f64;
        let angle = ((self.gantry + span * t) * 10.0).round() / 10.0;
        angle.rem_euclid(360.0)
    }

    /// MLC bank A then bank B at control point `i`
    pub fn leaves_at(&self, i: usize) -> Vec<f64> {
        let step = i as f64;
        let bank_a = (0..self.leaf_pairs).map(|j| -(5.0 + j as f64 + step * 0.5));
        let bank_b = (0..self.leaf_pairs).map(|j| 5.0 + j as f64 + step * 0.25);
        bank_a.chain(bank_b).collect()
    }

    fn weight_text(&self, i: usize) -> String {
        format!("{:.6}", i as f64 / (self.control_points - 1) as f64)
    }

    fn is_arc(&self) -> bool {
        self.arc.is_some()
    }

    fn control_point(&self, i: usize) -> InMemDicomObject {
        let last = self.control_points - 1;
        let mut elements = vec![
            is(tags::CONTROL_POINT_INDEX, i as i64),
            ds(tags::CUMULATIVE_METERSET_WEIGHT, &self.weight_text(i)),
        ];

        let mut devices = Vec::new();
        if i == 0 {
            devices.push(device("ASYMY", &[self.jaw[0], self.jaw[1]]));
            elements.extend([
                ds(tags::NOMINAL_BEAM_ENERGY, "6"),
                ds(tags::DOSE_RATE_SET, "600"),
                text(
                    tags::GANTRY_ROTATION_DIRECTION,
                    VR::CS,
                    match self.arc {
                        Some(span) if span < 0.0 => "CC",
                        Some(_) => "CW",
                        None => "NONE",
                    },
                ),
                ds(tags::BEAM_LIMITING_DEVICE_ANGLE, &format!("{:.1}", self.collimator)),
                text(tags::BEAM_LIMITING_DEVICE_ROTATION_DIRECTION, VR::CS, "NONE"),
                ds(tags::PATIENT_SUPPORT_ANGLE, "0"),
                text(tags::PATIENT_SUPPORT_ROTATION_DIRECTION, VR::CS, "NONE"),
                ds_multi(tags::ISOCENTER_POSITION, &[0.0, -12.5, 40.0]),
            ]);
        }
        if self.leaf_pairs > 0 && (i == 0 || !self.is_arc() || i % 2 == 0) {
            devices.push(device("MLCX", &self.leaves_at(i)));
        }
        if !devices.is_empty() {
            elements.push(sequence(tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE, devices));
        }
        if i == 0 || self.is_arc() {
            elements.push(ds(tags::GANTRY_ANGLE, &format!("{:.1}", self.gantry_at(i))));
        }
        if i == 0 || i == last {
            elements.push(ds(tags::SOURCE_TO_SURFACE_DISTANCE, &format!("{:.1}", self.ssd)));
        } else if self.is_arc() {
            elements.push(ds(tags::SOURCE_TO_SURFACE_DISTANCE, &format!("{:.1}", self.ssd - i as f64)));
        }
        InMemDicomObject::from_element_iter(elements)
    }

    fn beam_item(&self) -> InMemDicomObject {
        let mut limiting_devices = vec![InMemDicomObject::from_element_iter([
            text(tags::RT_BEAM_LIMITING_DEVICE_TYPE, VR::CS, "ASYMY"),
            is(tags::NUMBER_OF_LEAF_JAW_PAIRS, 1),
        ])];
        if self.leaf_pairs > 0 {
            let boundaries: Vec<f64> = (0..=self.leaf_pairs)
                .map(|j| -100.0 + 200.0 * j as f64 / self.leaf_pairs as f64)
                .collect();
            limiting_devices.push(InMemDicomObject::from_element_iter([
                text(tags::RT_BEAM_LIMITING_DEVICE_TYPE, VR::CS, "MLCX"),
                is(tags::NUMBER_OF_LEAF_JAW_PAIRS, self.leaf_pairs as i64),
                ds_multi(tags::LEAF_POSITION_BOUNDARIES, &boundaries),
            ]));
        }

        let points: Vec<InMemDicomObject> = (0..self.control_points).map(|i| self.control_point(i)).collect();
        InMemDicomObject::from_element_iter([
            text(tags::TREATMENT_MACHINE_NAME, VR::SH, "LINAC1"),
            text(tags::PRIMARY_DOSIMETER_UNIT, VR::CS, "MU"),
            ds(tags::SOURCE_AXIS_DISTANCE, "1000"),
            sequence(tags::BEAM_LIMITING_DEVICE_SEQUENCE, limiting_devices),
            is(tags::BEAM_NUMBER, self.number),
            text(tags::BEAM_NAME, VR::LO, &self.name),
            text(tags::BEAM_TYPE, VR::CS, if self.is_arc() { "DYNAMIC" } else { "STATIC" }),
            text(tags::RADIATION_TYPE, VR::CS, "PHOTON"),
            text(tags::TREATMENT_DELIVERY_TYPE, VR::CS, if self.setup { "SETUP" } else { "TREATMENT" }),
            is(tags::NUMBER_OF_WEDGES, 0),
            is(tags::NUMBER_OF_COMPENSATORS, 0),
            is(tags::NUMBER_OF_BOLI, 0),
            is(tags::NUMBER_OF_BLOCKS, 0),
            ds(tags::FINAL_CUMULATIVE_METERSET_WEIGHT, "1"),
            is(tags::NUMBER_OF_CONTROL_POINTS, self.control_points as i64),
            sequence(tags::CONTROL_POINT_SEQUENCE, points),
        ])
    }
}

/// Builder for synthetic RT Plans
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    label: Option<String>,
    beams: Vec<BeamSpec>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn beam(mut self, beam: BeamSpec) -> Self {
        self.beams.push(beam);
        self
    }

    pub fn beams(&self) -> &[BeamSpec] {
        &self.beams
    }

    pub fn build(&self) -> InMemDicomObject {
        let references: Vec<InMemDicomObject> = self
            .beams
            .iter()
            .filter(|beam| !beam.setup)
            .map(|beam| {
                InMemDicomObject::from_element_iter([
                    ds(tags::BEAM_DOSE, "1.5"),
                    ds(tags::BEAM_METERSET, &beam.meterset.to_string()),
                    is(tags::REFERENCED_BEAM_NUMBER, beam.number),
                ])
            })
            .collect();
        let fraction_group = InMemDicomObject::from_element_iter([
            is(tags::FRACTION_GROUP_NUMBER, 1),
            is(tags::NUMBER_OF_FRACTIONS_PLANNED, 25),
            is(tags::NUMBER_OF_BEAMS, references.len() as i64),
            is(tags::NUMBER_OF_BRACHY_APPLICATION_SETUPS, 0),
            sequence(tags::REFERENCED_BEAM_SEQUENCE, references),
        ]);
        let beams: Vec<InMemDicomObject> = self.beams.iter().map(BeamSpec::beam_item).collect();

        InMemDicomObject::from_element_iter([
            text(tags::SOP_CLASS_UID, VR::UI, uids::RT_PLAN_STORAGE),
            text(tags::SOP_INSTANCE_UID, VR::UI, PLAN_UID),
            text(tags::MODALITY, VR::CS, "RTPLAN"),
            text(tags::PATIENT_NAME, VR::PN, "Phantom^Water"),
            text(tags::PATIENT_ID, VR::LO, "QA0001"),
            text(tags::STUDY_INSTANCE_UID, VR::UI, STUDY_UID),
            text(tags::SERIES_INSTANCE_UID, VR::UI, SERIES_UID),
            text(tags::RT_PLAN_LABEL, VR::SH, self.label.as_deref().unwrap_or("QA")),
            text(tags::RT_PLAN_GEOMETRY, VR::CS, "PATIENT"),
            sequence(tags::FRACTION_GROUP_SEQUENCE, vec![fraction_group]),
            sequence(tags::BEAM_SEQUENCE, beams),
        ])
    }
}

/// The beams of [`static_plan`]
pub fn static_beams() -> Vec<BeamSpec> {
    vec![
        BeamSpec::new(1, 0.0).name("AP").control_points(3).meterset(100.0),
        BeamSpec::new(2, 90.0)
            .name("LAT")
            .control_points(5)
            .meterset(80.5)
            .collimator(10.0)
            .ssd(912.3),
        BeamSpec::new(3, 180.0)
            .name("PA")
            .control_points(4)
            .meterset(62.25)
            .jaw([-80.0, 95.5]),
    ]
}

/// Three static step-and-shoot fields at 0, 90 and 180 degrees
pub fn static_plan() -> InMemDicomObject {
    static_beams()
        .into_iter()
        .fold(PlanBuilder::new().label("3 Field"), PlanBuilder::beam)
        .build()
}

/// A single counter-clockwise arc with angles on every control point
pub fn arc_plan() -> InMemDicomObject {
    PlanBuilder::new()
        .label("Arc")
        .beam(BeamSpec::new(1, 179.0).arc(-178.0).control_points(9).meterset(240.0))
        .build()
}

/// Write `plan` to `dir/name` as an Explicit VR Little Endian Part 10 file
pub fn write_plan(dir: &Path, name: &str, plan: &InMemDicomObject) -> PathBuf {
    let path = dir.join(name);
    let sop_instance = plan
        .element(tags::SOP_INSTANCE_UID)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map_or_else(|| PLAN_UID.to_string(), |uid| uid.trim_end_matches('\0').to_string());
    let file = plan
        .clone()
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::RT_PLAN_STORAGE)
                .media_storage_sop_instance_uid(sop_instance),
        )
        .unwrap();
    file.write_to_file(&path).unwrap();
    path
}

/// Read a Part 10 file back into memory
pub fn read_plan(path: &Path) -> InMemDicomObject {
    let file = dicom::object::open_file(path).unwrap();
    (*file).clone()
}

fn text(tag: Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn ds(tag: Tag, value: &str) -> InMemElement {
    text(tag, VR::DS, value)
}

fn is(tag: Tag, value: i64) -> InMemElement {
    text(tag, VR::IS, &value.to_string())
}

fn ds_multi(tag: Tag, values: &[f64]) -> InMemElement {
    DataElement::new(
        tag,
        VR::DS,
        PrimitiveValue::Strs(values.iter().map(ToString::to_string).collect()),
    )
}

fn device(device_type: &str, positions: &[f64]) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        text(tags::RT_BEAM_LIMITING_DEVICE_TYPE, VR::CS, device_type),
        ds_multi(tags::LEAF_JAW_POSITIONS, positions),
    ])
}

fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, Value::Sequence(DataSetSequence::new(items, Length::UNDEFINED)))
}

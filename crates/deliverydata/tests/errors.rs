//! Malformed plans and delivery data fail fast with typed errors

use deliverydata::plan::{decimal_element, decimals_element, sequence_element, text_element};
use deliverydata::{
    delivery_data_to_dicom, dicom_to_delivery_data, dump_dataset, get_gantry_angles_from_dicom, ConversionError,
    StructureError, ValueError,
};
use deliverydata_test_utils::{static_plan, BeamSpec, PlanBuilder};
use dicom::core::VR;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;

fn item(elements: Vec<InMemElement>) -> InMemDicomObject {
    InMemDicomObject::from_element_iter(elements)
}

fn jaw(positions: [f64; 2]) -> InMemElement {
    sequence_element(
        tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE,
        vec![item(vec![
            text_element(tags::RT_BEAM_LIMITING_DEVICE_TYPE, VR::CS, "ASYMY"),
            decimals_element(tags::LEAF_JAW_POSITIONS, &positions),
        ])],
    )
}

/// One beam, number 1, with the given control points and a 100 MU fraction group
fn plan_with(points: Vec<InMemDicomObject>) -> InMemDicomObject {
    let reference = item(vec![
        decimal_element(tags::BEAM_METERSET, 100.0),
        text_element(tags::REFERENCED_BEAM_NUMBER, VR::IS, "1"),
    ]);
    plan_with_reference(points, reference)
}

fn plan_with_reference(points: Vec<InMemDicomObject>, reference: InMemDicomObject) -> InMemDicomObject {
    let beam = item(vec![
        text_element(tags::BEAM_NUMBER, VR::IS, "1"),
        sequence_element(tags::CONTROL_POINT_SEQUENCE, points),
    ]);
    let group = item(vec![sequence_element(tags::REFERENCED_BEAM_SEQUENCE, vec![reference])]);
    item(vec![
        sequence_element(tags::FRACTION_GROUP_SEQUENCE, vec![group]),
        sequence_element(tags::BEAM_SEQUENCE, vec![beam]),
    ])
}

fn first_point(gantry: &str) -> InMemDicomObject {
    item(vec![
        decimal_element(tags::CUMULATIVE_METERSET_WEIGHT, 0.0),
        text_element(tags::GANTRY_ANGLE, VR::DS, gantry),
        decimal_element(tags::BEAM_LIMITING_DEVICE_ANGLE, 0.0),
        jaw([-50.0, 50.0]),
    ])
}

fn last_point() -> InMemDicomObject {
    item(vec![decimal_element(tags::CUMULATIVE_METERSET_WEIGHT, 1.0)])
}

#[test]
fn minimal_plan_converts() {
    let plan = plan_with(vec![first_point("45"), last_point()]);
    let data = dicom_to_delivery_data(&plan).unwrap();
    assert_eq!(data.gantry, vec![45.0, 45.0]);
    assert_eq!(data.monitor_units, vec![0.0, 100.0]);
    assert!(data.mlc.iter().all(Vec::is_empty));
}

#[test]
fn missing_beam_sequence() {
    let err = dicom_to_delivery_data(&InMemDicomObject::new_empty()).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::MissingSequence { sequence: "BeamSequence", beam: None })
    ));
    assert!(get_gantry_angles_from_dicom(&InMemDicomObject::new_empty()).is_err());
}

#[test]
fn empty_control_point_sequence() {
    let err = dicom_to_delivery_data(&plan_with(Vec::new())).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::EmptySequence {
            sequence: "ControlPointSequence",
            beam: Some(0)
        })
    ));
}

#[test]
fn first_control_point_without_gantry() {
    let point = item(vec![
        decimal_element(tags::CUMULATIVE_METERSET_WEIGHT, 0.0),
        decimal_element(tags::BEAM_LIMITING_DEVICE_ANGLE, 0.0),
        jaw([-50.0, 50.0]),
    ]);
    let err = dicom_to_delivery_data(&plan_with(vec![point, last_point()])).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::MissingAttribute {
            attribute: "GantryAngle",
            beam: 0,
            control_point: Some(0)
        })
    ));
}

#[test]
fn non_numeric_gantry() {
    let err = dicom_to_delivery_data(&plan_with(vec![first_point("ninety"), last_point()])).unwrap_err();
    match err {
        ConversionError::Value(ValueError::NotNumeric { attribute, text, location }) => {
            assert_eq!(attribute, "GantryAngle");
            assert_eq!(text, "ninety");
            assert_eq!(location, "beam 0, control point 0");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn referenced_beam_without_meterset() {
    let reference = item(vec![text_element(tags::REFERENCED_BEAM_NUMBER, VR::IS, "1")]);
    let plan = plan_with_reference(vec![first_point("0"), last_point()], reference);
    let err = dicom_to_delivery_data(&plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::MissingBeamMeterset { beam_number: 1 })
    ));
}

#[test]
fn unreferenced_beams_deliver_nothing() {
    let mut plan = plan_with(vec![first_point("0"), last_point()]);
    plan.remove_element(tags::FRACTION_GROUP_SEQUENCE);
    let data = dicom_to_delivery_data(&plan).unwrap();
    assert_eq!(data.monitor_units, vec![0.0, 0.0]);

    let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
    assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
}

#[test]
fn monitor_units_for_a_setup_beam_are_rejected() {
    let plan = PlanBuilder::new()
        .beam(BeamSpec::new(1, 0.0).setup())
        .beam(BeamSpec::new(2, 90.0).control_points(3).meterset(100.0))
        .build();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    for mu in &mut data.monitor_units[1..] {
        *mu += 10.0;
    }

    let err = delivery_data_to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::MissingBeamMeterset { beam_number: 1 })
    ));
}

#[test]
fn too_few_delivery_points() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    let keep: Vec<usize> = (0..data.len() - 1).collect();
    data = data.select(&keep);

    let err = delivery_data_to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::ControlPointCountMismatch {
            beam: None,
            expected: 12,
            actual: 11
        })
    ));
}

#[test]
fn ragged_delivery_data() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.collimator.pop();
    let err = delivery_data_to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Value(ValueError::LengthMismatch { field: "collimator", .. })
    ));
}

#[test]
fn decreasing_monitor_units() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.monitor_units[5] = 1.0;
    let err = delivery_data_to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Value(ValueError::DecreasingMonitorUnits { index: 5, .. })
    ));
}

#[test]
fn wrong_leaf_count() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.mlc[4].pop();
    let err = delivery_data_to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Value(ValueError::LeafCountMismatch {
            index: 4,
            beam: 1,
            expected: 4,
            actual: 3
        })
    ));
}

#[test]
fn gantry_out_of_range() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.gantry[0] = -1.0;
    let err = delivery_data_to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Value(ValueError::AngleOutOfRange { field: "gantry", index: 0, .. })
    ));
}

#[test]
fn template_is_never_modified() {
    let plan = static_plan();
    let before = deliverydata::dump_dataset(&plan);
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.gantry[0] = 10.0;
    let _ = delivery_data_to_dicom(&data, &plan).unwrap();
    assert_eq!(before, deliverydata::dump_dataset(&plan));
}

//! Editing delivery data changes exactly the edited attributes

use deliverydata::{delivery_data_to_dicom, dicom_to_delivery_data, dump_dataset, get_gantry_angles_from_dicom};
use deliverydata_test_utils::static_plan;
use dicom::object::InMemDicomObject;
use pretty_assertions::assert_eq;

/// Lines of the two dumps that differ; dumps must have the same shape
fn changed_lines(before: &InMemDicomObject, after: &InMemDicomObject) -> Vec<(String, String)> {
    let before = dump_dataset(before);
    let after = dump_dataset(after);
    assert_eq!(before.lines().count(), after.lines().count());
    before
        .lines()
        .zip(after.lines())
        .filter(|(a, b)| a != b)
        .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
        .collect()
}

#[test]
fn rotating_a_whole_beam_rewrites_one_gantry_angle() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    for angle in &mut data.gantry[3..8] {
        *angle = 95.0;
    }

    let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
    let changes = changed_lines(&plan, &rebuilt);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, "(300A,011E) GantryAngle DS [90.0]");
    assert_eq!(changes[0].1, "(300A,011E) GantryAngle DS [95]");

    assert_eq!(get_gantry_angles_from_dicom(&rebuilt).unwrap(), vec![0.0, 95.0, 180.0]);
    assert_eq!(dicom_to_delivery_data(&rebuilt).unwrap(), data);
}

#[test]
fn moving_one_leaf_rewrites_one_position_list() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.mlc[1][0][0] = -7.0;

    let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
    let changes = changed_lines(&plan, &rebuilt);
    assert_eq!(changes.len(), 1);
    assert!(changes[0].1.starts_with("(300A,011C) LeafJawPositions DS [-7\\"));

    let reread = dicom_to_delivery_data(&rebuilt).unwrap();
    assert_eq!(reread.mlc[1][0], [-7.0, 5.25]);
    assert_eq!(reread.mlc[2], data.mlc[2]);
}

#[test]
fn changing_an_inherited_angle_makes_the_next_point_explicit() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    // beam 2, control point 1 only
    data.collimator[4] = 12.0;

    let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
    let dump = dump_dataset(&rebuilt);
    // control points 1 and 2 each gain an explicit angle
    assert_eq!(dump.lines().count(), dump_dataset(&plan).lines().count() + 2);
    assert!(dump.contains("BeamLimitingDeviceAngle DS [12]"));
    assert!(dump.contains("BeamLimitingDeviceAngle DS [10]"));
    assert_eq!(dicom_to_delivery_data(&rebuilt).unwrap(), data);
}

#[test]
fn removing_an_ssd_drops_the_attribute() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.source_to_surface_distance[2] = None;

    let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
    let reread = dicom_to_delivery_data(&rebuilt).unwrap();
    assert_eq!(reread.source_to_surface_distance[2], None);
    assert_eq!(reread.source_to_surface_distance[0], Some(950.0));
}

#[test]
fn scaling_a_beam_rewrites_its_meterset() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    // beam 1 delivers 120 MU instead of 100; later beams shift with it
    for mu in &mut data.monitor_units[..3] {
        *mu *= 1.2;
    }
    for mu in &mut data.monitor_units[3..] {
        *mu += 20.0;
    }

    let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
    let changes = changed_lines(&plan, &rebuilt);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, "(300A,0086) BeamMeterset DS [100]");
    assert_eq!(changes[0].1, "(300A,0086) BeamMeterset DS [120]");

    let reread = dicom_to_delivery_data(&rebuilt).unwrap();
    for (a, b) in reread.monitor_units.iter().zip(&data.monitor_units) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }
}

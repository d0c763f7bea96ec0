//! Nearest-gantry beam matching

use deliverydata::{
    dicom_to_delivery_data, dump_dataset, BeamMatching, ConversionConfig, ConversionError, DeliveryData,
    DeliveryDataConverter, StructureError,
};
use deliverydata_test_utils::{arc_plan, static_plan, BeamSpec, PlanBuilder};
use pretty_assertions::assert_eq;
use std::ops::Range;

/// Control point index ranges of the static fixture's beams
const BEAMS: [Range<usize>; 3] = [0..3, 3..8, 8..12];

/// Delivery data with beams delivered in `order`, MU renumbered to stay cumulative
fn reorder(data: &DeliveryData, order: &[usize]) -> DeliveryData {
    reorder_beams(data, &BEAMS, order)
}

fn reorder_beams(data: &DeliveryData, beams: &[Range<usize>], order: &[usize]) -> DeliveryData {
    let mut reordered = DeliveryData::new();
    let mut offset = 0.0;
    for &beam in order {
        let range = beams[beam].clone();
        let start = if range.start == 0 { 0.0 } else { data.monitor_units[range.start - 1] };
        let mut end = start;
        for k in range {
            let mut point = data.control_point(k).unwrap();
            point.monitor_units = offset + (point.monitor_units - start);
            end = data.monitor_units[k];
            reordered.push(point);
        }
        offset += end - start;
    }
    reordered
}

fn nearest() -> DeliveryDataConverter {
    DeliveryDataConverter::new(ConversionConfig::new().with_beam_matching(BeamMatching::NearestGantry))
}

#[test]
fn reordered_beams_rebuild_the_template() {
    let plan = static_plan();
    let data = dicom_to_delivery_data(&plan).unwrap();
    let reordered = reorder(&data, &[2, 0, 1]);
    assert!(reordered.validate().is_ok());
    assert_eq!(reordered.gantry[0], 180.0);

    let rebuilt = nearest().to_dicom(&reordered, &plan).unwrap();
    assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
}

#[test]
fn positional_matching_misplaces_reordered_beams() {
    let plan = static_plan();
    let data = dicom_to_delivery_data(&plan).unwrap();
    // beams 1 and 3 swap places
    let reordered = reorder(&data, &[2, 1, 0]);

    let result = DeliveryDataConverter::default().to_dicom(&reordered, &plan);
    match result {
        Ok(rebuilt) => assert_ne!(dump_dataset(&plan), dump_dataset(&rebuilt)),
        Err(err) => assert!(matches!(err, ConversionError::Structure(_))),
    }
}

#[test]
fn small_gantry_drift_is_tolerated() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    for angle in &mut data.gantry[3..8] {
        *angle = 91.5;
    }
    let reordered = reorder(&data, &[1, 0, 2]);

    let rebuilt = nearest().to_dicom(&reordered, &plan).unwrap();
    let back = dicom_to_delivery_data(&rebuilt).unwrap();
    assert_eq!(&back.gantry[3..8], &[91.5; 5]);
}

#[test]
fn drift_beyond_tolerance_is_rejected() {
    let plan = static_plan();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    data.gantry[9] = 45.0;

    let err = nearest().to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::NoBeamWithinTolerance { index: 9, .. })
    ));

    let wide = DeliveryDataConverter::new(
        ConversionConfig::new()
            .with_beam_matching(BeamMatching::NearestGantry)
            .with_gantry_tolerance(50.0),
    );
    // 45 is now within reach of the beams at 0 and 90
    assert!(matches!(
        wide.to_dicom(&data, &plan).unwrap_err(),
        ConversionError::Structure(StructureError::AmbiguousBeamMatch {
            index: 9,
            first: 0,
            second: 1,
            ..
        })
    ));
}

#[test]
fn beams_sharing_an_angle_are_ambiguous() {
    let plan = PlanBuilder::new()
        .beam(BeamSpec::new(1, 90.0))
        .beam(BeamSpec::new(2, 90.0))
        .build();
    let data = dicom_to_delivery_data(&plan).unwrap();

    let err = nearest().to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::AmbiguousBeamMatch { first: 0, second: 1, .. })
    ));

    // positional matching has no such problem
    let rebuilt = DeliveryDataConverter::default().to_dicom(&data, &plan).unwrap();
    assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
}

#[test]
fn arc_plan_rebuilds_with_nearest_gantry() {
    let plan = arc_plan();
    let data = dicom_to_delivery_data(&plan).unwrap();

    let rebuilt = nearest().to_dicom(&data, &plan).unwrap();
    assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
}

#[test]
fn reordered_arcs_rebuild_the_template() {
    let plan = PlanBuilder::new()
        .beam(BeamSpec::new(1, 10.0).arc(80.0).control_points(5).meterset(120.0))
        .beam(BeamSpec::new(2, 190.0).arc(80.0).control_points(5).meterset(95.5))
        .build();
    let data = dicom_to_delivery_data(&plan).unwrap();
    let reordered = reorder_beams(&data, &[0..5, 5..10], &[1, 0]);
    assert_eq!(reordered.gantry[0], 190.0);

    let rebuilt = nearest().to_dicom(&reordered, &plan).unwrap();
    assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
}

#[test]
fn arc_points_between_control_points_match_the_arc() {
    let plan = PlanBuilder::new()
        .beam(BeamSpec::new(1, 10.0).arc(80.0).control_points(5))
        .beam(BeamSpec::new(2, 180.0))
        .build();
    let mut data = dicom_to_delivery_data(&plan).unwrap();
    // control points sit at 10, 30, 50, 70 and 90; 40 lies on the arc
    data.gantry[2] = 40.0;

    let rebuilt = nearest().to_dicom(&data, &plan).unwrap();
    let back = dicom_to_delivery_data(&rebuilt).unwrap();
    assert_eq!(back.gantry[2], 40.0);
}

#[test]
fn overlapping_arcs_are_ambiguous() {
    let plan = PlanBuilder::new()
        .beam(BeamSpec::new(1, 10.0).arc(80.0).control_points(5))
        .beam(BeamSpec::new(2, 90.0).arc(-80.0).control_points(5))
        .build();
    let data = dicom_to_delivery_data(&plan).unwrap();

    let err = nearest().to_dicom(&data, &plan).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Structure(StructureError::AmbiguousBeamMatch {
            index: 0,
            first: 0,
            second: 1,
            ..
        })
    ));
}

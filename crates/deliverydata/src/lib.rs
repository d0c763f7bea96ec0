//! DICOM RT Plan ↔ delivery data conversion
//!
//! Flattens the beams of an RT Plan into per-control-point delivery data
//! (monitor units, gantry and collimator angles, MLC and jaw positions,
//! source to surface distance), and rebuilds an RT Plan from delivery data
//! using the original plan as a template.
//!
//! # Core Operations
//!
//! - **Extract**: [`dicom_to_delivery_data`] turns a plan into [`DeliveryData`]
//! - **Rebuild**: [`delivery_data_to_dicom`] writes delivery data back onto a template
//! - **Inspect**: [`get_gantry_angles_from_dicom`] and the [`inspect`] helpers
//!
//! # Architecture
//!
//! ```text
//! RT Plan ──extract──→ DeliveryData ──rebuild(template)──→ RT Plan'
//!    └──────────────────── template ─────────────────────────↑
//! ```
//!
//! Rebuilding only touches attributes whose delivery value differs from
//! the template, so extract followed by rebuild against the same plan
//! reproduces it exactly (see [`dump_dataset`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use deliverydata::{delivery_data_to_dicom, dicom_to_delivery_data, dump_dataset};
//!
//! let plan = dicom::object::open_file("plan.dcm")?;
//! let data = dicom_to_delivery_data(&plan)?;
//! let rebuilt = delivery_data_to_dicom(&data, &plan)?;
//! assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod convert;
pub mod delivery;
pub mod dump;
pub mod error;
pub mod inspect;
pub mod plan;
pub mod unique;

pub use config::{BeamMatching, ConversionConfig};
pub use convert::{
    delivery_data_to_dicom, dicom_to_delivery_data, get_gantry_angles_from_dicom, DeliveryDataConverter,
};
pub use delivery::{ControlPoint, DeliveryData};
pub use dump::{dump_dataset, DatasetDump};
pub use error::{ConfigError, ConversionError, ConversionResult, StructureError, ValueError};
pub use inspect::{first_mlc_positions, num_of_control_points, source_to_surface_distances, summarize, PlanSummary};
pub use unique::maintain_order_unique;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for converting plans
    pub use crate::config::{BeamMatching, ConversionConfig};
    pub use crate::convert::{
        delivery_data_to_dicom, dicom_to_delivery_data, get_gantry_angles_from_dicom, DeliveryDataConverter,
    };
    pub use crate::delivery::DeliveryData;
    pub use crate::dump::dump_dataset;
    pub use crate::error::{ConversionError, ConversionResult};
    pub use crate::unique::maintain_order_unique;
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use deliverydata_test_utils::{static_plan, BeamSpec, PlanBuilder};

    #[test]
    fn static_plan_round_trips() {
        let plan = static_plan();
        let data = dicom_to_delivery_data(&plan).unwrap();
        let rebuilt = delivery_data_to_dicom(&data, &plan).unwrap();
        assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
    }

    #[test]
    fn gantry_angles_match_unique_delivery_gantry() {
        let plan = static_plan();
        let data = dicom_to_delivery_data(&plan).unwrap();
        assert_eq!(
            maintain_order_unique(&data.gantry),
            get_gantry_angles_from_dicom(&plan).unwrap()
        );
    }

    #[test]
    fn converter_uses_its_config() {
        let plan = PlanBuilder::new()
            .beam(BeamSpec::new(1, 0.0).control_points(2))
            .beam(BeamSpec::new(2, 180.0).control_points(2))
            .build();
        let converter =
            DeliveryDataConverter::new(ConversionConfig::new().with_beam_matching(BeamMatching::NearestGantry));
        assert_eq!(converter.config().beam_matching, BeamMatching::NearestGantry);

        let data = converter.to_delivery_data(&plan).unwrap();
        let rebuilt = converter.to_dicom(&data, &plan).unwrap();
        assert_eq!(dump_dataset(&plan), dump_dataset(&rebuilt));
    }
}

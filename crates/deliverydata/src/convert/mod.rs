//! DeliveryData converter
//!
//! Two directions:
//! - **Extract**: RT Plan → [`DeliveryData`], one entry per control point
//! - **Rebuild**: [`DeliveryData`] + template RT Plan → RT Plan
//!
//! Rebuilding is lossless: extracting a plan and rebuilding it against
//! itself reproduces the template element for element.

mod extract;
mod matching;
mod rebuild;

use crate::config::ConversionConfig;
use crate::delivery::DeliveryData;
use crate::error::ConversionResult;
use dicom::object::InMemDicomObject;

/// Converter between RT Plans and delivery data
///
/// # Example
///
/// ```rust,ignore
/// use deliverydata::{BeamMatching, ConversionConfig, DeliveryDataConverter};
///
/// let converter = DeliveryDataConverter::new(
///     ConversionConfig::new().with_beam_matching(BeamMatching::NearestGantry),
/// );
/// let data = converter.to_delivery_data(&plan)?;
/// let rebuilt = converter.to_dicom(&data, &plan)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeliveryDataConverter {
    config: ConversionConfig,
}

impl DeliveryDataConverter {
    /// Create converter with the given configuration
    #[inline]
    #[must_use]
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Flatten an RT Plan into delivery data
    ///
    /// # Errors
    /// - [`StructureError`](crate::StructureError) if beams, control points,
    ///   first-control-point attributes are missing, or a referenced beam has no meterset
    /// - [`ValueError`](crate::ValueError) if an attribute is not numeric
    pub fn to_delivery_data(&self, plan: &InMemDicomObject) -> ConversionResult<DeliveryData> {
        extract::extract(plan)
    }

    /// Build a new RT Plan from delivery data, using `template` for
    /// everything delivery data does not describe
    ///
    /// # Errors
    /// - [`ValueError`](crate::ValueError) if the delivery data fails validation
    /// - [`StructureError`](crate::StructureError) if the delivery data cannot
    ///   be matched onto the template's beams and control points
    pub fn to_dicom(
        &self,
        data: &DeliveryData,
        template: &InMemDicomObject,
    ) -> ConversionResult<InMemDicomObject> {
        rebuild::rebuild(data, template, &self.config)
    }
}

/// Flatten an RT Plan into delivery data
///
/// # Errors
/// See [`DeliveryDataConverter::to_delivery_data`]
pub fn dicom_to_delivery_data(plan: &InMemDicomObject) -> ConversionResult<DeliveryData> {
    DeliveryDataConverter::default().to_delivery_data(plan)
}

/// Build a new RT Plan from delivery data and a template, with default
/// (positional) beam matching
///
/// # Errors
/// See [`DeliveryDataConverter::to_dicom`]
pub fn delivery_data_to_dicom(
    data: &DeliveryData,
    template: &InMemDicomObject,
) -> ConversionResult<InMemDicomObject> {
    DeliveryDataConverter::default().to_dicom(data, template)
}

/// Gantry angles stated explicitly in the plan, beam by beam
///
/// Control points that inherit their angle contribute nothing.
///
/// # Errors
/// Returns error if beams or control points are missing or an angle is
/// not numeric
pub fn get_gantry_angles_from_dicom(plan: &InMemDicomObject) -> ConversionResult<Vec<f64>> {
    extract::gantry_angles(plan)
}

//! Conversion configuration
//!
//! Loaded from TOML or built in code:
//!
//! ```toml
//! beam_matching = "nearest_gantry"
//! gantry_tolerance = 3.0
//! value_tolerance = 1e-6
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How delivery data control points are assigned to template beams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamMatching {
    /// Entries fill template beams in order, beam by beam
    #[default]
    Positional,
    /// Each entry goes to the one beam whose gantry travel lies within
    /// `gantry_tolerance` of its angle
    ///
    /// An entry within reach of two beams is an error, so overlapping arcs
    /// or beams closer than twice the tolerance need positional matching.
    NearestGantry,
}

/// Options for [`DeliveryDataConverter`](crate::DeliveryDataConverter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Beam assignment strategy when rebuilding a plan
    pub beam_matching: BeamMatching,
    /// Maximum gantry distance (degrees) for [`BeamMatching::NearestGantry`]
    pub gantry_tolerance: f64,
    /// Relative tolerance under which a delivery value counts as unchanged
    pub value_tolerance: f64,
}

impl ConversionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With beam matching strategy
    #[inline]
    #[must_use]
    pub fn with_beam_matching(mut self, beam_matching: BeamMatching) -> Self {
        self.beam_matching = beam_matching;
        self
    }

    /// With gantry tolerance in degrees
    #[inline]
    #[must_use]
    pub fn with_gantry_tolerance(mut self, degrees: f64) -> Self {
        self.gantry_tolerance = degrees;
        self
    }

    /// With relative value tolerance
    #[inline]
    #[must_use]
    pub fn with_value_tolerance(mut self, tolerance: f64) -> Self {
        self.value_tolerance = tolerance;
        self
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or a tolerance is invalid
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or does not validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Check tolerances are finite and non-negative
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTolerance`] naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("gantry_tolerance", self.gantry_tolerance),
            ("value_tolerance", self.value_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidTolerance { field, value });
            }
        }
        Ok(())
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            beam_matching: BeamMatching::Positional,
            gantry_tolerance: 3.0,
            value_tolerance: 1e-6,
        }
    }
}

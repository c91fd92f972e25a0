//! Query configuration.
//!
//! A [`QueryConfig`] names a circle: a center and a radius in meters. It is
//! serializable so that queries can be described in JSON or TOML files.
//!
//! # Example
//!
//! ```rust
//! use geoquery::QueryConfig;
//!
//! let json = r#"{
//!     "center": { "latitude": 37.7853, "longitude": -122.4054 },
//!     "radius_meters": 1500.0
//! }"#;
//! let config = QueryConfig::from_json_str(json).unwrap();
//! assert_eq!(config.radius_km(), 1.5);
//! ```

use crate::compute::validation::validate_radius;
use crate::error::{GeoQueryError, Result};
use geoquery_types::Location;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const KILOMETER_TO_METER: f64 = 1000.0;

/// Largest radius for which the decomposition is well defined, in kilometers.
pub const MAX_SUPPORTED_RADIUS_KM: f64 = 8587.0;

/// [`MAX_SUPPORTED_RADIUS_KM`] in meters.
pub const MAX_SUPPORTED_RADIUS_METERS: f64 = MAX_SUPPORTED_RADIUS_KM * KILOMETER_TO_METER;

/// Clamp a radius in meters to [`MAX_SUPPORTED_RADIUS_METERS`].
pub fn cap_radius(radius_meters: f64) -> f64 {
    if radius_meters > MAX_SUPPORTED_RADIUS_METERS {
        log::warn!(
            "Radius {}m is larger than the maximum supported radius of {}m; capping",
            radius_meters,
            MAX_SUPPORTED_RADIUS_METERS
        );
        MAX_SUPPORTED_RADIUS_METERS
    } else {
        radius_meters
    }
}

/// Center and radius of a live query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub center: Location,

    /// Radius in meters
    pub radius_meters: f64,
}

impl QueryConfig {
    /// Create a config, validating and capping the radius.
    pub fn new(center: Location, radius_meters: f64) -> Result<Self> {
        validate_radius(radius_meters)?;
        Ok(Self {
            center,
            radius_meters: cap_radius(radius_meters),
        })
    }

    pub fn with_radius_km(center: Location, radius_km: f64) -> Result<Self> {
        Self::new(center, radius_km * KILOMETER_TO_METER)
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_meters / KILOMETER_TO_METER
    }

    /// Validate a deserialized config and cap its radius.
    pub fn validate(self) -> Result<Self> {
        Self::new(self.center, self.radius_meters)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()
    }

    /// Load a config file. The format is chosen by extension: `.json`, or
    /// `.toml` when the `toml` feature is enabled.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GeoQueryError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml_str(&contents),
            other => Err(GeoQueryError::Config(format!(
                "Unsupported config format: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sf() -> Location {
        Location::new(37.7853, -122.4054).unwrap()
    }

    #[test]
    fn test_radius_capped() {
        let config = QueryConfig::new(sf(), 10_000_000.0).unwrap();
        assert_eq!(config.radius_meters, MAX_SUPPORTED_RADIUS_METERS);

        let config = QueryConfig::with_radius_km(sf(), 9000.0).unwrap();
        assert_eq!(config.radius_km(), MAX_SUPPORTED_RADIUS_KM);
    }

    #[test]
    fn test_invalid_radius() {
        assert!(QueryConfig::new(sf(), -5.0).is_err());
        assert!(QueryConfig::new(sf(), f64::NAN).is_err());
    }

    #[test]
    fn test_json() {
        let json = r#"{"center": {"latitude": 10.0, "longitude": 20.0}, "radius_meters": 250.0}"#;
        let config = QueryConfig::from_json_str(json).unwrap();
        assert_eq!(config.center, Location::new(10.0, 20.0).unwrap());
        assert_eq!(config.radius_meters, 250.0);

        let bad_center = r#"{"center": {"latitude": 100.0, "longitude": 20.0}, "radius_meters": 250.0}"#;
        assert!(matches!(
            QueryConfig::from_json_str(bad_center),
            Err(GeoQueryError::Config(_))
        ));
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"center": {{"latitude": -33.8688, "longitude": 151.2093}}, "radius_meters": 20000000.0}}"#
        )
        .unwrap();

        let config = QueryConfig::load(file.path()).unwrap();
        assert_eq!(config.radius_meters, MAX_SUPPORTED_RADIUS_METERS);
    }

    #[test]
    fn test_load_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            QueryConfig::load(file.path()),
            Err(GeoQueryError::Config(_))
        ));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml() {
        let toml_str = r#"
            radius_meters = 500.0

            [center]
            latitude = 37.0
            longitude = -122.0
        "#;
        let config = QueryConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.radius_km(), 0.5);
    }
}

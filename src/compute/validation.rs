//! Input validation for coordinates, precisions, radii and keys.

use crate::compute::geohash::{MAX_PRECISION, is_valid_base32};
use crate::error::{GeoQueryError, Result};
use geoquery_types::Location;

/// Validates a latitude/longitude pair and returns the resulting location.
///
/// # Examples
///
/// ```
/// use geoquery::compute::validation::validate_coordinates;
///
/// assert!(validate_coordinates(37.7, -122.4).is_ok());
/// assert!(validate_coordinates(95.0, 0.0).is_err());
/// assert!(validate_coordinates(0.0, f64::NAN).is_err());
/// ```
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Location> {
    if !latitude.is_finite() {
        return Err(GeoQueryError::InvalidArgument(format!(
            "Latitude must be finite, got: {}",
            latitude
        )));
    }

    if !longitude.is_finite() {
        return Err(GeoQueryError::InvalidArgument(format!(
            "Longitude must be finite, got: {}",
            longitude
        )));
    }

    Ok(Location::new(latitude, longitude)?)
}

/// Validates a geohash precision (number of characters).
pub fn validate_precision(precision: usize) -> Result<()> {
    if precision < 1 {
        return Err(GeoQueryError::InvalidArgument(
            "Precision of a geohash must be larger than zero".to_string(),
        ));
    }
    if precision > MAX_PRECISION {
        return Err(GeoQueryError::InvalidArgument(format!(
            "Precision of a geohash must be at most {}, got: {}",
            MAX_PRECISION, precision
        )));
    }
    Ok(())
}

/// Validates a geohash string: non-empty and base32 only.
pub fn validate_geohash(hash: &str) -> Result<()> {
    if hash.is_empty() || !is_valid_base32(hash) {
        return Err(GeoQueryError::InvalidArgument(format!(
            "Not a valid geohash: {:?}",
            hash
        )));
    }
    Ok(())
}

/// Validates a query radius in meters. Zero is allowed, negative or non-finite is not.
pub fn validate_radius(radius_meters: f64) -> Result<()> {
    if !radius_meters.is_finite() {
        return Err(GeoQueryError::InvalidArgument(format!(
            "Radius must be finite, got: {}",
            radius_meters
        )));
    }
    if radius_meters < 0.0 {
        return Err(GeoQueryError::InvalidArgument(format!(
            "Radius must not be negative, got: {}",
            radius_meters
        )));
    }
    Ok(())
}

/// Validates a record key.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GeoQueryError::InvalidArgument(
            "Key must not be empty".to_string(),
        ));
    }
    Ok(())
}

//! Geohash precision needed to cover a given distance.
//!
//! A geohash with `n` bits splits latitude into `ceil(n / 2)` halvings and
//! longitude into `floor(n / 2)` (plus one for the odd bit). These helpers pick
//! the largest bit count whose cells are still at least as large as a circle's
//! bounding box, so that the 3x3 neighbourhood around the center covers it.

use crate::compute::geo_utils::{
    EARTH_MERIDIONAL_CIRCUMFERENCE, distance_to_latitude_degrees, distance_to_longitude_degrees,
};
use crate::compute::geohash::MAX_PRECISION_BITS;
use geoquery_types::Location;

/// Bits of latitude precision whose cells are at least `resolution` meters tall.
pub fn bits_latitude(resolution: f64) -> f64 {
    (EARTH_MERIDIONAL_CIRCUMFERENCE / 2.0 / resolution)
        .log2()
        .min(MAX_PRECISION_BITS as f64)
}

/// Bits of longitude precision whose cells are at least `resolution` meters
/// wide at `latitude`. Never less than one.
pub fn bits_longitude(resolution: f64, latitude: f64) -> f64 {
    let degrees = distance_to_longitude_degrees(resolution, latitude);
    if degrees.abs() > 0.0 {
        (360.0 / degrees).log2().max(1.0)
    } else {
        1.0
    }
}

/// Total geohash bits for a bounding box of `size` meters around `location`.
///
/// Longitude is evaluated at both the northern and southern edge of the box
/// because cells shrink toward the poles; the poleward edge usually wins.
///
/// # Examples
///
/// ```
/// use geoquery::compute::bits_for_bounding_box;
/// use geoquery_types::Location;
///
/// let loc = Location::new(35.0, 0.0).unwrap();
/// assert_eq!(bits_for_bounding_box(&loc, 1000.0), 28);
/// ```
pub fn bits_for_bounding_box(location: &Location, size: f64) -> i32 {
    let latitude_delta = distance_to_latitude_degrees(size);
    let latitude_north = (location.latitude() + latitude_delta).min(90.0);
    let latitude_south = (location.latitude() - latitude_delta).max(-90.0);

    let bits_lat = (bits_latitude(size).floor() as i32).saturating_mul(2);
    let bits_lon_north = (bits_longitude(size, latitude_north).floor() as i32) * 2 - 1;
    let bits_lon_south = (bits_longitude(size, latitude_south).floor() as i32) * 2 - 1;

    bits_lat.min(bits_lon_north).min(bits_lon_south)
}

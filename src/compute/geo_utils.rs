//! Earth constants and the distance/degree conversions used by the decomposer.

use geoquery_types::Location;

/// Length of one degree of latitude, in meters.
pub const METERS_PER_DEGREE_LATITUDE: f64 = 110_574.0;

/// Meridional circumference of the earth, in meters.
pub const EARTH_MERIDIONAL_CIRCUMFERENCE: f64 = 40_007_860.0;

/// Equatorial radius of the earth, in meters.
pub const EARTH_EQ_RADIUS: f64 = 6_378_137.0;

/// Polar radius of the earth, in meters.
pub const EARTH_POLAR_RADIUS: f64 = 6_357_852.3;

/// Eccentricity squared, `(r_e^2 - r_p^2) / r_e^2` with `r_p = 6356752.3`.
pub const EARTH_E2: f64 = 0.006_694_478_197_99;

/// Cutoff for floating point comparisons.
pub const EPSILON: f64 = 1e-12;

/// Great-circle distance in meters between two locations.
///
/// Haversine over the mean of the equatorial and polar radii. This is the
/// authoritative inside/outside test for live queries.
///
/// # Examples
///
/// ```
/// use geoquery::compute::distance;
/// use geoquery_types::Location;
///
/// let a = Location::new(37.0, -122.0).unwrap();
/// let b = Location::new(37.0001, -122.0001).unwrap();
/// let d = distance(&a, &b);
/// assert!(d > 10.0 && d < 20.0);
/// ```
pub fn distance(a: &Location, b: &Location) -> f64 {
    distance_coords(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}

/// [`distance`] on raw coordinates.
pub fn distance_coords(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let radius = (EARTH_EQ_RADIUS + EARTH_POLAR_RADIUS) / 2.0;
    let lat_delta = (lat1 - lat2).to_radians();
    let lon_delta = (lon1 - lon2).to_radians();

    let a = (lat_delta / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (lon_delta / 2.0).sin().powi(2);
    radius * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Converts a distance in meters to degrees of latitude.
pub fn distance_to_latitude_degrees(distance: f64) -> f64 {
    distance / METERS_PER_DEGREE_LATITUDE
}

/// Converts a distance in meters to degrees of longitude at the given latitude.
///
/// Accounts for meridian convergence on the ellipsoid. Near the poles, where a
/// degree of longitude has no length, any positive distance maps to 360.
pub fn distance_to_longitude_degrees(distance: f64, latitude: f64) -> f64 {
    let radians = latitude.to_radians();
    let numerator = radians.cos() * EARTH_EQ_RADIUS * std::f64::consts::PI / 180.0;
    let denominator = 1.0 / (1.0 - EARTH_E2 * radians.sin() * radians.sin()).sqrt();
    let delta_degrees = numerator * denominator;
    if delta_degrees < EPSILON {
        if distance > 0.0 { 360.0 } else { distance }
    } else {
        (distance / delta_degrees).min(360.0)
    }
}

/// Wraps a longitude into [-180, 180].
///
/// Values already in range are returned unchanged, so both 180 and -180 survive.
pub fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    let adjusted = longitude + 180.0;
    if adjusted > 0.0 {
        (adjusted % 360.0) - 180.0
    } else {
        180.0 - (-adjusted % 360.0)
    }
}

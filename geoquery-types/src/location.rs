use geo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returned when a latitude/longitude pair is out of range or not finite.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Not a valid geo location: [{latitude}, {longitude}]")]
pub struct InvalidLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A geographic location with latitude in [-90, 90] and longitude in [-180, 180].
///
/// The coordinates are stored in a `geo::Point` (x = longitude, y = latitude),
/// so a `Location` can be handed to any `geo` algorithm without conversion.
/// Construction is the only way to obtain one, which makes every instance valid.
///
/// # Examples
///
/// ```
/// use geoquery_types::location::Location;
///
/// let nyc = Location::new(40.7128, -74.0060).unwrap();
/// assert_eq!(nyc.longitude(), -74.0060);
///
/// assert!(Location::new(f64::NAN, 0.0).is_err());
/// assert!(Location::new(0.0, 180.5).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocationRepr", into = "LocationRepr")]
pub struct Location {
    point: Point<f64>,
}

impl Location {
    /// Create a location, validating both coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidLocation> {
        if Self::coordinates_valid(latitude, longitude) {
            Ok(Self {
                point: Point::new(longitude, latitude),
            })
        } else {
            Err(InvalidLocation {
                latitude,
                longitude,
            })
        }
    }

    /// Check whether the pair would form a valid location.
    pub fn coordinates_valid(latitude: f64, longitude: f64) -> bool {
        latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude)
    }

    /// Create a location from a `geo::Point` (x = longitude, y = latitude).
    pub fn from_point(point: Point<f64>) -> Result<Self, InvalidLocation> {
        Self::new(point.y(), point.x())
    }

    pub fn latitude(&self) -> f64 {
        self.point.y()
    }

    pub fn longitude(&self) -> f64 {
        self.point.x()
    }

    /// Get the underlying `geo::Point`.
    pub fn point(&self) -> Point<f64> {
        self.point
    }

    /// Coordinates as `[latitude, longitude]`, the order used on the wire.
    pub fn to_array(&self) -> [f64; 2] {
        [self.latitude(), self.longitude()]
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({}, {})", self.latitude(), self.longitude())
    }
}

impl TryFrom<[f64; 2]> for Location {
    type Error = InvalidLocation;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1])
    }
}

impl From<Location> for Point<f64> {
    fn from(location: Location) -> Self {
        location.point
    }
}

#[derive(Serialize, Deserialize)]
struct LocationRepr {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<LocationRepr> for Location {
    type Error = InvalidLocation;

    fn try_from(repr: LocationRepr) -> Result<Self, Self::Error> {
        Self::new(repr.latitude, repr.longitude)
    }
}

impl From<Location> for LocationRepr {
    fn from(location: Location) -> Self {
        Self {
            latitude: location.latitude(),
            longitude: location.longitude(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_locations() {
        assert!(Location::new(0.0, 0.0).is_ok());
        assert!(Location::new(-90.0, -180.0).is_ok());
        assert!(Location::new(90.0, 180.0).is_ok());
        assert!(Location::new(47.2, -122.4).is_ok());
    }

    #[test]
    fn test_invalid_locations() {
        assert!(Location::new(-90.1, 0.0).is_err());
        assert!(Location::new(90.1, 0.0).is_err());
        assert!(Location::new(0.0, -180.1).is_err());
        assert!(Location::new(0.0, 180.1).is_err());
        assert!(Location::new(f64::NAN, 0.0).is_err());
        assert!(Location::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = Location::new(37.0, -122.0).unwrap();
        let b = Location::new(37.0, -122.0).unwrap();
        let c = Location::new(37.0001, -122.0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_point_axis_order() {
        let loc = Location::new(40.7128, -74.0060).unwrap();
        let point: Point<f64> = loc.into();
        assert_eq!(point.x(), -74.0060);
        assert_eq!(point.y(), 40.7128);
        assert_eq!(Location::from_point(point).unwrap(), loc);
    }

    #[test]
    fn test_serde_validates() {
        let loc = Location::new(12.5, 45.25).unwrap();
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, r#"{"latitude":12.5,"longitude":45.25}"#);
        assert_eq!(serde_json::from_str::<Location>(&json).unwrap(), loc);

        let bad = r#"{"latitude":120.0,"longitude":0.0}"#;
        assert!(serde_json::from_str::<Location>(bad).is_err());
    }
}

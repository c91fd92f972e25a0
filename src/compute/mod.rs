//! Compute layer: geohash encoding and radius decomposition.
//!
//! Everything here is pure and synchronous. The live query engine in
//! [`crate::query`] builds on these functions to decide which store ranges
//! to subscribe to and which keys are inside a circle.

pub mod bits;
pub mod geo_utils;
pub mod geohash;
pub mod ranges;
pub mod validation;

pub use bits::{bits_for_bounding_box, bits_latitude, bits_longitude};
pub use geo_utils::{
    distance, distance_to_latitude_degrees, distance_to_longitude_degrees, wrap_longitude,
};
pub use geohash::GeoHash;
pub use ranges::{SubRange, queries_at_location, query_for_hash};

//! Decomposition of a circle into geohash sub-ranges.
//!
//! A [`SubRange`] is a half-open interval `[start, end)` over geohash strings.
//! Every record whose geohash falls in the interval is delivered by one range
//! subscription on the backing store. [`queries_at_location`] picks the cells
//! around a circle and merges them into as few ranges as possible.

use crate::compute::bits::bits_for_bounding_box;
use crate::compute::geo_utils::{
    METERS_PER_DEGREE_LATITUDE, distance_to_longitude_degrees, wrap_longitude,
};
use crate::compute::geohash::{
    BITS_PER_BASE32_CHAR, GeoHash, MAX_PRECISION_BITS, base32_char_to_value, value_to_base32_char,
};
use crate::compute::validation::validate_radius;
use crate::error::{GeoQueryError, Result};
use geoquery_types::Location;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Marker that sorts after every base32 character. `"6~"` ends the range of
/// all hashes starting with `6`.
pub const UNBOUNDED_MARKER: char = '~';

/// Half-open geohash interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubRange {
    start: String,
    end: String,
}

impl SubRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Whether `hash` lies in `[start, end)`.
    pub fn contains(&self, hash: &str) -> bool {
        self.start.as_str() <= hash && hash < self.end.as_str()
    }

    pub fn contains_geohash(&self, hash: &GeoHash) -> bool {
        self.contains(hash.as_str())
    }

    /// `other` begins before `self` and ends inside it.
    pub fn is_prefix_of(&self, other: &SubRange) -> bool {
        other.end >= self.start && other.start < self.start && other.end < self.end
    }

    /// `other` fully contains `self`.
    pub fn is_super_range_of(&self, other: &SubRange) -> bool {
        other.start <= self.start && other.end >= self.end
    }

    /// Whether the two ranges overlap or touch so that one range can replace both.
    pub fn can_join(&self, other: &SubRange) -> bool {
        self.is_prefix_of(other)
            || other.is_prefix_of(self)
            || self.is_super_range_of(other)
            || other.is_super_range_of(self)
    }

    /// Merge two joinable ranges.
    ///
    /// Returns a [`GeoQueryError::Logic`] error when the pair is not joinable;
    /// callers are expected to check [`SubRange::can_join`] first.
    pub fn join(&self, other: &SubRange) -> Result<SubRange> {
        if other.is_prefix_of(self) {
            Ok(SubRange::new(self.start.clone(), other.end.clone()))
        } else if self.is_prefix_of(other) {
            Ok(SubRange::new(other.start.clone(), self.end.clone()))
        } else if self.is_super_range_of(other) {
            Ok(other.clone())
        } else if other.is_super_range_of(self) {
            Ok(self.clone())
        } else {
            Err(GeoQueryError::Logic(format!(
                "Can't join these 2 ranges: {}, {}",
                self, other
            )))
        }
    }
}

impl fmt::Display for SubRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// The range of hashes that share the first `bits` bits of `hash`.
///
/// # Examples
///
/// ```
/// use geoquery::compute::{GeoHash, SubRange, query_for_hash};
///
/// let hash = GeoHash::parse("64m9yn96mx").unwrap();
/// assert_eq!(query_for_hash(&hash, 6).unwrap(), SubRange::new("60", "6h"));
/// assert_eq!(query_for_hash(&hash, 1).unwrap(), SubRange::new("0", "h"));
/// ```
pub fn query_for_hash(hash: &GeoHash, bits: u32) -> Result<SubRange> {
    if bits == 0 {
        return Err(GeoQueryError::InvalidArgument(
            "A sub-range needs at least one bit".to_string(),
        ));
    }
    let hash = hash.as_str();
    let precision = (bits as usize).div_ceil(BITS_PER_BASE32_CHAR);
    if hash.len() < precision {
        return Ok(SubRange::new(hash, format!("{}{}", hash, UNBOUNDED_MARKER)));
    }

    let hash = &hash[..precision];
    let (base, last) = hash.split_at(precision - 1);
    let last_value = match last.chars().next() {
        Some(c) => base32_char_to_value(c)?,
        None => return Err(GeoQueryError::Logic("Empty geohash tail".to_string())),
    };

    let significant_bits = bits as usize - base.len() * BITS_PER_BASE32_CHAR;
    let unused_bits = BITS_PER_BASE32_CHAR - significant_bits;
    let start_value = (last_value >> unused_bits) << unused_bits;
    let end_value = start_value as u32 + (1u32 << unused_bits);

    let start = format!("{}{}", base, value_to_base32_char(start_value)?);
    let end = if end_value > 31 {
        format!("{}{}", base, UNBOUNDED_MARKER)
    } else {
        format!("{}{}", base, value_to_base32_char(end_value as u8)?)
    };
    Ok(SubRange::new(start, end))
}

/// Sub-ranges that together cover every location within `radius` meters of `center`.
///
/// Encodes the center and its eight compass neighbours at the bounding-box
/// precision, turns each cell into a range and merges joinable ranges until
/// none remain. Result is sorted.
///
/// # Examples
///
/// ```
/// use geoquery::compute::queries_at_location;
/// use geoquery_types::Location;
///
/// let center = Location::new(37.7853, -122.4054).unwrap();
/// let ranges = queries_at_location(&center, 1000.0).unwrap();
/// assert!(!ranges.is_empty() && ranges.len() <= 9);
/// ```
pub fn queries_at_location(center: &Location, radius: f64) -> Result<BTreeSet<SubRange>> {
    validate_radius(radius)?;

    let query_bits = bits_for_bounding_box(center, radius).clamp(1, MAX_PRECISION_BITS as i32) as u32;
    let precision = (query_bits as usize).div_ceil(BITS_PER_BASE32_CHAR);

    let latitude = center.latitude();
    let longitude = center.longitude();
    let latitude_degrees = radius / METERS_PER_DEGREE_LATITUDE;
    let latitude_north = (latitude + latitude_degrees).min(90.0);
    let latitude_south = (latitude - latitude_degrees).max(-90.0);
    let longitude_delta = distance_to_longitude_degrees(radius, latitude_north)
        .max(distance_to_longitude_degrees(radius, latitude_south));

    let west = wrap_longitude(longitude - longitude_delta);
    let east = wrap_longitude(longitude + longitude_delta);

    let candidates = [
        (latitude, longitude),
        (latitude, east),
        (latitude, west),
        (latitude_north, longitude),
        (latitude_north, east),
        (latitude_north, west),
        (latitude_south, longitude),
        (latitude_south, east),
        (latitude_south, west),
    ];

    let mut ranges = BTreeSet::new();
    for (lat, lon) in candidates {
        let hash = GeoHash::encode_coords(lat, lon, precision)?;
        ranges.insert(query_for_hash(&hash, query_bits)?);
    }

    join_ranges(ranges)
}

/// Repeatedly replaces a joinable pair by its join until no pair is joinable.
pub fn join_ranges(mut ranges: BTreeSet<SubRange>) -> Result<BTreeSet<SubRange>> {
    while let Some((a, b)) = find_joinable(&ranges) {
        ranges.remove(&a);
        ranges.remove(&b);
        ranges.insert(a.join(&b)?);
    }
    Ok(ranges)
}

fn find_joinable(ranges: &BTreeSet<SubRange>) -> Option<(SubRange, SubRange)> {
    let items: Vec<&SubRange> = ranges.iter().collect();
    for (i, a) in items.iter().enumerate() {
        for b in &items[i + 1..] {
            if a.can_join(b) {
                return Some(((*a).clone(), (*b).clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> SubRange {
        SubRange::new(start, end)
    }

    fn hash(s: &str) -> GeoHash {
        GeoHash::parse(s).unwrap()
    }

    #[test]
    fn test_query_for_hash() {
        assert_eq!(query_for_hash(&hash("64m9yn96mx"), 6).unwrap(), range("60", "6h"));
        assert_eq!(query_for_hash(&hash("64m9yn96mx"), 1).unwrap(), range("0", "h"));
        assert_eq!(query_for_hash(&hash("64m9yn96mx"), 10).unwrap(), range("64", "65"));
        assert_eq!(query_for_hash(&hash("6409yn96mx"), 11).unwrap(), range("640", "64h"));
        assert_eq!(query_for_hash(&hash("64m9yn96mx"), 11).unwrap(), range("64h", "64~"));
        assert_eq!(query_for_hash(&hash("6"), 10).unwrap(), range("6", "6~"));
        assert_eq!(query_for_hash(&hash("64z178"), 12).unwrap(), range("64s", "64~"));
        assert_eq!(query_for_hash(&hash("64z178"), 15).unwrap(), range("64z", "64~"));
    }

    #[test]
    fn test_query_for_hash_zero_bits() {
        assert!(query_for_hash(&hash("64m9"), 0).is_err());
    }

    #[test]
    fn test_can_join() {
        assert!(range("abcd", "abce").can_join(&range("abce", "abcf")));
        assert!(range("abce", "abcf").can_join(&range("abcd", "abce")));
        assert!(range("abcd", "abcf").can_join(&range("abcd", "abce")));
        assert!(range("abcd", "abcf").can_join(&range("abce", "abcf")));
        assert!(range("abc", "abd").can_join(&range("abce", "abcf")));
        assert!(range("abce", "abcf").can_join(&range("abc", "abd")));
        assert!(range("abcd", "abce~").can_join(&range("abc", "abd")));
        assert!(range("abcd", "abce~").can_join(&range("abce", "abcf")));
        assert!(range("abcd", "abcf").can_join(&range("abce", "abcg")));

        assert!(!range("abcd", "abce").can_join(&range("abcg", "abch")));
        assert!(!range("abcd", "abce").can_join(&range("dce", "dcf")));
        assert!(!range("abc", "abd").can_join(&range("dce", "dcf")));
    }

    #[test]
    fn test_join() {
        let cases = [
            (range("abcd", "abce"), range("abce", "abcf"), range("abcd", "abcf")),
            (range("abce", "abcf"), range("abcd", "abce"), range("abcd", "abcf")),
            (range("abcd", "abcf"), range("abcd", "abce"), range("abcd", "abcf")),
            (range("abcd", "abcf"), range("abce", "abcf"), range("abcd", "abcf")),
            (range("abc", "abd"), range("abce", "abcf"), range("abc", "abd")),
            (range("abce", "abcf"), range("abc", "abd"), range("abc", "abd")),
            (range("abcd", "abce~"), range("abc", "abd"), range("abc", "abd")),
            (range("abcd", "abce~"), range("abce", "abcf"), range("abcd", "abcf")),
            (range("abcd", "abcf"), range("abce", "abcg"), range("abcd", "abcg")),
        ];
        for (a, b, expected) in cases {
            assert_eq!(a.join(&b).unwrap(), expected, "{} join {}", a, b);
            assert_eq!(b.join(&a).unwrap(), expected, "{} join {}", b, a);
        }
    }

    #[test]
    fn test_join_rejects_disjoint() {
        for (a, b) in [
            (range("abcd", "abce"), range("abcg", "abch")),
            (range("abcd", "abce"), range("dce", "dcf")),
            (range("abc", "abd"), range("dce", "dcf")),
        ] {
            assert!(matches!(a.join(&b), Err(GeoQueryError::Logic(_))));
        }
    }

    #[test]
    fn test_contains() {
        let r = range("9q8", "9q9");
        assert!(r.contains("9q8"));
        assert!(r.contains("9q8yywe56g"));
        assert!(!r.contains("9q9"));
        assert!(!r.contains("9q7zzzzzzz"));

        let unbounded = range("64h", "64~");
        assert!(unbounded.contains("64zzzzzz"));
        assert!(!unbounded.contains("65"));
    }

    #[test]
    fn test_queries_fully_joined() {
        let center = Location::new(37.0, -122.0).unwrap();
        for radius in [0.0, 10.0, 500.0, 10_000.0, 250_000.0, 8_587_000.0] {
            let ranges = queries_at_location(&center, radius).unwrap();
            assert!(!ranges.is_empty());
            assert!(ranges.len() <= 9);
            let items: Vec<_> = ranges.iter().collect();
            for (i, a) in items.iter().enumerate() {
                for b in &items[i + 1..] {
                    assert!(!a.can_join(b), "{} and {} should have been joined", a, b);
                }
            }
        }
    }

    #[test]
    fn test_queries_near_poles_and_dateline() {
        for (lat, lon) in [(90.0, 0.0), (-90.0, 45.0), (0.0, 180.0), (0.0, -180.0), (89.99, 179.99)] {
            let center = Location::new(lat, lon).unwrap();
            let ranges = queries_at_location(&center, 1000.0).unwrap();
            let own = GeoHash::new(&center);
            assert!(ranges.iter().any(|r| r.contains_geohash(&own)));
        }
    }

    #[test]
    fn test_queries_reject_bad_radius() {
        let center = Location::new(0.0, 0.0).unwrap();
        assert!(queries_at_location(&center, -1.0).is_err());
        assert!(queries_at_location(&center, f64::NAN).is_err());
    }

    #[test]
    fn test_tiny_radius_clamps_precision() {
        let center = Location::new(12.0, 34.0).unwrap();
        let ranges = queries_at_location(&center, 1e-20).unwrap();
        assert_eq!(ranges.len(), 1);
        let only = ranges.iter().next().unwrap();
        assert_eq!(only.start().len(), 22);
        assert!(only.contains_geohash(&GeoHash::encode(&center, 22).unwrap()));
    }

    #[test]
    fn test_zero_radius_is_one_bit() {
        // A zero width needs no longitude precision, so only the first bit is kept.
        let east = queries_at_location(&Location::new(12.0, 34.0).unwrap(), 0.0).unwrap();
        assert_eq!(east.into_iter().collect::<Vec<_>>(), vec![range("h", "~")]);

        let origin = queries_at_location(&Location::new(0.0, 0.0).unwrap(), 0.0).unwrap();
        assert_eq!(origin.into_iter().collect::<Vec<_>>(), vec![range("0", "h")]);
    }
}

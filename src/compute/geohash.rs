//! Geohash encoding.
//!
//! A geohash interleaves longitude and latitude bisection bits (longitude on
//! even bit indexes) and packs them five at a time into a base32 alphabet that
//! omits `a`, `i`, `l` and `o`. Lexicographic order of hashes follows the
//! nesting of cells: a hash lies inside every cell named by one of its prefixes.

use crate::compute::validation::{validate_coordinates, validate_geohash, validate_precision};
use crate::error::{GeoQueryError, Result};
use geoquery_types::Location;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of bits encoded by one base32 character.
pub const BITS_PER_BASE32_CHAR: usize = 5;

/// Precision used for record hashes.
pub const DEFAULT_PRECISION: usize = 10;

/// Longest supported geohash, in characters.
pub const MAX_PRECISION: usize = 22;

/// Longest supported geohash, in bits.
pub const MAX_PRECISION_BITS: usize = MAX_PRECISION * BITS_PER_BASE32_CHAR;

const BASE32_CHARS: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Maps a 5-bit value to its base32 character.
pub fn value_to_base32_char(value: u8) -> Result<char> {
    BASE32_CHARS
        .get(value as usize)
        .map(|&c| c as char)
        .ok_or_else(|| GeoQueryError::InvalidArgument(format!("Not a valid base32 value: {}", value)))
}

/// Maps a base32 character back to its 5-bit value.
pub fn base32_char_to_value(c: char) -> Result<u8> {
    BASE32_CHARS
        .iter()
        .position(|&b| b as char == c)
        .map(|idx| idx as u8)
        .ok_or_else(|| GeoQueryError::InvalidArgument(format!("Not a valid base32 char: {:?}", c)))
}

/// Whether every character of `s` is in the base32 alphabet. The empty string passes.
pub fn is_valid_base32(s: &str) -> bool {
    s.bytes().all(|b| BASE32_CHARS.contains(&b))
}

/// A validated geohash string.
///
/// Equality and ordering are those of the underlying string.
///
/// # Examples
///
/// ```
/// use geoquery::compute::GeoHash;
/// use geoquery_types::Location;
///
/// let sf = Location::new(37.7853074, -122.4054274).unwrap();
/// assert_eq!(GeoHash::encode(&sf, 10).unwrap().as_str(), "9q8yywe56g");
///
/// let parsed: GeoHash = "9q8yy".parse().unwrap();
/// assert!(GeoHash::encode(&sf, 10).unwrap().as_str().starts_with(parsed.as_str()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoHash(String);

impl GeoHash {
    /// Encode a location at the default precision.
    pub fn new(location: &Location) -> Self {
        Self(encode_unchecked(location, DEFAULT_PRECISION))
    }

    /// Encode a location with `precision` characters, in [1, 22].
    pub fn encode(location: &Location, precision: usize) -> Result<Self> {
        validate_precision(precision)?;
        Ok(Self(encode_unchecked(location, precision)))
    }

    /// Encode raw coordinates, validating them first.
    pub fn encode_coords(latitude: f64, longitude: f64, precision: usize) -> Result<Self> {
        let location = validate_coordinates(latitude, longitude)?;
        Self::encode(&location, precision)
    }

    /// Parse an existing geohash string.
    pub fn parse(hash: &str) -> Result<Self> {
        validate_geohash(hash)?;
        Ok(Self(hash.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of characters.
    pub fn precision(&self) -> usize {
        self.0.len()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Caller guarantees precision is in [1, MAX_PRECISION].
fn encode_unchecked(location: &Location, precision: usize) -> String {
    let mut longitude_range = [-180.0_f64, 180.0];
    let mut latitude_range = [-90.0_f64, 90.0];
    let mut hash = String::with_capacity(precision);

    for i in 0..precision {
        let mut value = 0u8;
        for j in 0..BITS_PER_BASE32_CHAR {
            let even = (i * BITS_PER_BASE32_CHAR + j) % 2 == 0;
            let (coord, range) = if even {
                (location.longitude(), &mut longitude_range)
            } else {
                (location.latitude(), &mut latitude_range)
            };
            let mid = (range[0] + range[1]) / 2.0;
            if coord > mid {
                value = (value << 1) + 1;
                range[0] = mid;
            } else {
                value <<= 1;
                range[1] = mid;
            }
        }
        hash.push(BASE32_CHARS[value as usize] as char);
    }
    hash
}

impl fmt::Display for GeoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GeoHash {
    type Err = GeoQueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GeoHash {
    type Error = GeoQueryError;

    fn try_from(value: String) -> Result<Self> {
        validate_geohash(&value)?;
        Ok(Self(value))
    }
}

impl From<GeoHash> for String {
    fn from(hash: GeoHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for GeoHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(lat: f64, lon: f64, precision: usize) -> String {
        GeoHash::encode_coords(lat, lon, precision)
            .unwrap()
            .into_string()
    }

    #[test]
    fn test_hash_values() {
        assert_eq!(hash(0.0, 0.0, 10), "7zzzzzzzzz");
        assert_eq!(hash(0.0, -180.0, 10), "2pbpbpbpbp");
        assert_eq!(hash(0.0, 180.0, 10), "rzzzzzzzzz");
        assert_eq!(hash(-90.0, 0.0, 10), "5bpbpbpbpb");
        assert_eq!(hash(-90.0, -180.0, 10), "0000000000");
        assert_eq!(hash(-90.0, 180.0, 10), "pbpbpbpbpb");
        assert_eq!(hash(90.0, 0.0, 10), "gzzzzzzzzz");
        assert_eq!(hash(90.0, -180.0, 10), "bpbpbpbpbp");
        assert_eq!(hash(90.0, 180.0, 10), "zzzzzzzzzz");

        assert_eq!(hash(37.7853074, -122.4054274, 10), "9q8yywe56g");
        assert_eq!(hash(38.98719, -77.250783, 10), "dqcjf17sy6");
        assert_eq!(hash(29.3760648, 47.9818853, 10), "tj4p5gerfz");
        assert_eq!(hash(78.216667, 15.55, 10), "umghcygjj7");
        assert_eq!(hash(-54.933333, -67.616667, 10), "4qpzmren1k");
        assert_eq!(hash(-54.0, -67.0, 10), "4w2kg3s54y");
    }

    #[test]
    fn test_custom_precision() {
        assert_eq!(hash(-90.0, -180.0, 6), "000000");
        assert_eq!(hash(90.0, 180.0, 20), "zzzzzzzzzzzzzzzzzzzz");
        assert_eq!(hash(-90.0, 180.0, 1), "p");
        assert_eq!(hash(90.0, -180.0, 5), "bpbpb");
        assert_eq!(hash(37.7853074, -122.4054274, 8), "9q8yywe5");
        assert_eq!(hash(38.98719, -77.250783, 18), "dqcjf17sy6cppp8vfn");
        assert_eq!(hash(29.3760648, 47.9818853, 12), "tj4p5gerfzqu");
        assert_eq!(hash(78.216667, 15.55, 1), "u");
        assert_eq!(hash(-54.933333, -67.616667, 7), "4qpzmre");
        assert_eq!(hash(-54.0, -67.0, 9), "4w2kg3s54");
    }

    #[test]
    fn test_default_precision() {
        let loc = Location::new(37.7853074, -122.4054274).unwrap();
        assert_eq!(GeoHash::new(&loc).as_str(), "9q8yywe56g");
        assert_eq!(GeoHash::new(&loc).precision(), DEFAULT_PRECISION);
    }

    #[test]
    fn test_precision_errors() {
        assert!(GeoHash::encode_coords(1.0, 2.0, 0).is_err());
        assert!(GeoHash::encode_coords(1.0, 2.0, 23).is_err());
        assert!(GeoHash::encode_coords(1.0, 2.0, 22).is_ok());
        assert!(GeoHash::encode_coords(91.0, 2.0, 5).is_err());
        assert!(matches!(
            GeoHash::encode_coords(f64::NAN, 2.0, 5),
            Err(GeoQueryError::InvalidArgument(msg)) if msg.contains("Latitude")
        ));
        assert!(matches!(
            GeoHash::encode_coords(1.0, f64::INFINITY, 5),
            Err(GeoQueryError::InvalidArgument(msg)) if msg.contains("Longitude")
        ));
    }

    #[test]
    fn test_parse() {
        assert!(GeoHash::parse("abc").is_err());
        assert!(GeoHash::parse("").is_err());
        assert!(GeoHash::parse("~").is_err());
        assert_eq!(GeoHash::parse("9q8yy").unwrap().as_str(), "9q8yy");
        assert!("dr5r".parse::<GeoHash>().is_ok());
    }

    #[test]
    fn test_prefix_stability() {
        let loc = Location::new(-33.8688, 151.2093).unwrap();
        for p in 1..MAX_PRECISION {
            let shorter = GeoHash::encode(&loc, p).unwrap();
            let longer = GeoHash::encode(&loc, p + 1).unwrap();
            assert!(longer.as_str().starts_with(shorter.as_str()));
        }
    }

    #[test]
    fn test_base32_round_trip_alphabet() {
        for value in 0..32u8 {
            let c = value_to_base32_char(value).unwrap();
            assert_eq!(base32_char_to_value(c).unwrap(), value);
        }
        assert!(value_to_base32_char(32).is_err());
        assert!(base32_char_to_value('a').is_err());
        assert!(base32_char_to_value('~').is_err());
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let json = serde_json::to_string(&GeoHash::parse("9q8").unwrap()).unwrap();
        assert_eq!(json, "\"9q8\"");
        assert!(serde_json::from_str::<GeoHash>("\"9qa\"").is_err());
    }
}

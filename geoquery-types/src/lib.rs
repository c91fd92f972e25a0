//! # geoquery-types
//!
//! Core value types shared by the geoquery crates.
//!
//! - **Location**: a validated latitude/longitude pair backed by `geo::Point`
//!
//! All types are serializable with Serde.
//!
//! ## Examples
//!
//! ```rust
//! use geoquery_types::location::Location;
//!
//! let sf = Location::new(37.7853074, -122.4054274).unwrap();
//! assert_eq!(sf.latitude(), 37.7853074);
//! assert!(Location::new(91.0, 0.0).is_err());
//! ```

pub mod location;

pub use location::{InvalidLocation, Location};

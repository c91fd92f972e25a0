//! Backing store abstraction.
//!
//! The live query engine only needs a handful of capabilities from a store:
//! range subscriptions over the indexed geohash field, a one-shot signal once
//! a subscription's backlog has been delivered, point reads, and plain writes.
//! [`LocationStore`] captures that contract so that remote databases and the
//! in-memory [`MemoryStore`] are interchangeable.
//!
//! Implementations must return promptly from every method and must never call
//! an observer or callback synchronously from the calling thread: the engine
//! invokes them while holding its own lock.

pub mod memory;

pub use memory::MemoryStore;

use crate::compute::geohash::GeoHash;
use crate::compute::ranges::SubRange;
use crate::error::StoreError;
use geoquery_types::Location;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Handle identifying one range subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Stored shape of a location record.
///
/// `g` is the geohash at default precision (the indexed field), `l` is
/// `[latitude, longitude]`. Any other fields travel along in `data`.
///
/// ```
/// use geoquery::store::LocationRecord;
/// use geoquery_types::Location;
///
/// let record = LocationRecord::new(&Location::new(37.7853074, -122.4054274).unwrap());
/// let json = serde_json::to_value(&record).unwrap();
/// assert_eq!(json["g"], "9q8yywe56g");
/// assert_eq!(json["l"][0], 37.7853074);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub g: String,
    pub l: [f64; 2],
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl LocationRecord {
    pub fn new(location: &Location) -> Self {
        Self::with_data(location, Map::new())
    }

    pub fn with_data(location: &Location, data: Map<String, Value>) -> Self {
        Self {
            g: GeoHash::new(location).into_string(),
            l: location.to_array(),
            data,
        }
    }

    /// The record's location, or `None` if `l` is not a valid coordinate pair.
    pub fn location(&self) -> Option<Location> {
        Location::try_from(self.l).ok()
    }

    /// Parse a raw JSON value, returning `None` for anything that is not a record.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Receives change notifications for one range subscription.
pub trait RangeObserver: Send + Sync {
    /// A record entered the range, either from the backlog or a later write.
    fn on_added(&self, key: &str, record: &LocationRecord);

    /// A record already in the range was rewritten and is still in the range.
    fn on_changed(&self, key: &str, record: &LocationRecord);

    /// A record left the range, either deleted or moved outside it.
    fn on_removed(&self, key: &str);

    /// The subscription failed after it was established.
    fn on_error(&self, error: StoreError);
}

/// Fired once after a subscription's backlog has been delivered.
pub type SnapshotCallback = Box<dyn FnOnce(Result<(), StoreError>) + Send + 'static>;

/// Fired once with the result of a point read.
pub type PointReadCallback =
    Box<dyn FnOnce(Result<Option<LocationRecord>, StoreError>) + Send + 'static>;

/// Capabilities the engine needs from a backing store.
pub trait LocationStore: Send + Sync {
    /// Stream added/changed/removed for records whose `g` lies in `range`.
    fn subscribe_range(
        &self,
        range: &SubRange,
        observer: Arc<dyn RangeObserver>,
    ) -> Result<SubscriptionId, StoreError>;

    /// Stop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Register a callback for the end of the subscription's initial backlog.
    fn on_initial_snapshot(&self, id: SubscriptionId, done: SnapshotCallback);

    /// Read the current record for `key`.
    fn point_read(&self, key: &str, done: PointReadCallback);

    /// Create or replace the record for `key`.
    fn write(&self, key: &str, record: LocationRecord) -> Result<(), StoreError>;

    /// Delete the record for `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

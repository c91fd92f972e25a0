//! Live radius queries over a geohash-indexed key/location store.
//!
//! Locations are stored with a geohash at fixed precision. A query for a
//! circle is decomposed into a small set of lexicographic geohash ranges,
//! each backed by a store subscription, and the resulting notifications are
//! turned into `entered`, `exited`, `moved`, `changed` and `ready` events.
//!
//! ```rust
//! use geoquery::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let index = GeoIndex::new(store.clone(), Arc::new(ThreadDispatcher::new()));
//! index.set_location("tram-12", Location::new(52.5200, 13.4050)?)?;
//!
//! let query = index.query_at_location(Location::new(52.5201, 13.4049)?, 1.0)?;
//! let (tx, rx) = crossbeam_channel::unbounded();
//! query.add_data_listener(Arc::new(EventSender::new(tx)))?;
//!
//! assert!(matches!(rx.recv().unwrap(), QueryEvent::Entered { .. }));
//! assert!(matches!(rx.recv().unwrap(), QueryEvent::Ready));
//! # Ok::<(), geoquery::GeoQueryError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod query;
pub mod radius;
pub mod store;

pub use builder::GeoQueryBuilder;
pub use config::{
    KILOMETER_TO_METER, MAX_SUPPORTED_RADIUS_KM, MAX_SUPPORTED_RADIUS_METERS, QueryConfig,
};
pub use error::{GeoQueryError, Result, StoreError};
pub use index::GeoIndex;
pub use query::{
    EventSender, GeoQuery, GeoQueryDataEventListener, GeoQueryEventListener, ListenerId,
    QueryEvent, QueryPhase,
};
pub use radius::RadiusFinder;

pub use compute::{GeoHash, SubRange, distance, queries_at_location, query_for_hash};
pub use dispatch::{Dispatcher, ManualDispatcher, ThreadDispatcher};
pub use store::{LocationRecord, LocationStore, MemoryStore, RangeObserver, SubscriptionId};

pub use geoquery_types::{InvalidLocation, Location};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoQueryBuilder, GeoQueryError, QueryConfig, Result};

    pub use crate::{
        EventSender, GeoQuery, GeoQueryDataEventListener, GeoQueryEventListener, ListenerId,
        QueryEvent, QueryPhase,
    };

    pub use crate::{GeoIndex, RadiusFinder};

    pub use crate::{Dispatcher, ManualDispatcher, ThreadDispatcher};

    pub use crate::{LocationRecord, LocationStore, MemoryStore};

    pub use crate::{GeoHash, SubRange, distance};

    pub use geoquery_types::Location;
}

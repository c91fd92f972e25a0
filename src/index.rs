//! Write/read facade over a location store.
//!
//! [`GeoIndex`] is what applications use to publish locations: it builds the
//! stored record (geohash plus coordinates) so the range subscriptions of
//! live queries can find it, and opens queries against the same store.

use crate::compute::validation::validate_key;
use crate::config::QueryConfig;
use crate::dispatch::Dispatcher;
use crate::error::{GeoQueryError, Result, StoreError};
use crate::query::GeoQuery;
use crate::store::{LocationRecord, LocationStore};
use geoquery_types::Location;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Geo index over a [`LocationStore`].
///
/// # Examples
///
/// ```rust
/// use geoquery::prelude::*;
/// use std::sync::Arc;
///
/// let index = GeoIndex::new(Arc::new(MemoryStore::new()), Arc::new(ThreadDispatcher::new()));
/// index.set_location("firebase-hq", Location::new(37.7853889, -122.4056973)?)?;
///
/// let query = index.query_at_location(Location::new(37.7832, -122.4056)?, 0.6)?;
/// assert_eq!(query.radius(), 600.0);
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
#[derive(Clone)]
pub struct GeoIndex {
    store: Arc<dyn LocationStore>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl GeoIndex {
    pub fn new(store: Arc<dyn LocationStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &Arc<dyn LocationStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Store `location` for `key`, replacing any previous location.
    pub fn set_location(&self, key: &str, location: Location) -> Result<()> {
        self.set_location_with_data(key, location, Map::new())
    }

    /// Store `location` for `key` along with extra fields kept in the record.
    pub fn set_location_with_data(
        &self,
        key: &str,
        location: Location,
        data: Map<String, Value>,
    ) -> Result<()> {
        validate_key(key)?;
        let record = LocationRecord::with_data(&location, data);
        log::trace!("Setting {} to {} ({})", key, location, record.g);
        self.store.write(key, record)?;
        Ok(())
    }

    pub fn remove_location(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.store.delete(key)?;
        Ok(())
    }

    /// Look up the stored location of `key`.
    ///
    /// `callback` runs on the index's dispatcher with `Ok(None)` if the key
    /// has no location, or an error if the record is malformed or the read
    /// failed.
    pub fn get_location<F>(&self, key: &str, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Option<Location>>) + Send + 'static,
    {
        validate_key(key)?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let owned_key = key.to_string();
        let done = move |read: std::result::Result<Option<LocationRecord>, StoreError>| {
            let result = match read {
                Ok(None) => Ok(None),
                Ok(Some(record)) => record.location().map(Some).ok_or_else(|| {
                    GeoQueryError::Logic(format!(
                        "Location data for {} has an invalid format",
                        owned_key
                    ))
                }),
                Err(e) => Err(e.into()),
            };
            dispatcher.dispatch(Box::new(move || callback(result)));
        };
        self.store.point_read(key, Box::new(done));
        Ok(())
    }

    /// Open a live query around `center` with a radius in kilometers.
    pub fn query_at_location(&self, center: Location, radius_km: f64) -> Result<GeoQuery> {
        let config = QueryConfig::with_radius_km(center, radius_km)?;
        Ok(self.query(config))
    }

    /// Open a live query from a config.
    pub fn query(&self, config: QueryConfig) -> GeoQuery {
        GeoQuery::new(
            config,
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
        )
    }
}

//! Query builder
//!
//! Collects the center, radius, store, and dispatcher for a [`GeoQuery`]
//! and validates them together.

use crate::config::{KILOMETER_TO_METER, QueryConfig};
use crate::dispatch::Dispatcher;
use crate::error::{GeoQueryError, Result};
use crate::query::GeoQuery;
use crate::store::LocationStore;
use geoquery_types::Location;
use std::sync::Arc;

/// Builder for live queries.
///
/// ```rust
/// use geoquery::prelude::*;
/// use std::sync::Arc;
///
/// let query = GeoQueryBuilder::new(Arc::new(MemoryStore::new()), Arc::new(ThreadDispatcher::new()))
///     .center(Location::new(51.5074, -0.1278)?)
///     .radius_km(2.0)
///     .build()?;
/// assert_eq!(query.radius(), 2000.0);
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
pub struct GeoQueryBuilder {
    store: Arc<dyn LocationStore>,
    dispatcher: Arc<dyn Dispatcher>,
    center: Option<Location>,
    radius_meters: f64,
}

impl GeoQueryBuilder {
    /// Start a builder with a zero radius and no center.
    pub fn new(store: Arc<dyn LocationStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            center: None,
            radius_meters: 0.0,
        }
    }

    pub fn center(mut self, center: Location) -> Self {
        self.center = Some(center);
        self
    }

    pub fn radius_meters(mut self, radius: f64) -> Self {
        self.radius_meters = radius;
        self
    }

    pub fn radius_km(mut self, radius: f64) -> Self {
        self.radius_meters = radius * KILOMETER_TO_METER;
        self
    }

    /// Take center and radius from a loaded config.
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.center = Some(config.center);
        self.radius_meters = config.radius_meters;
        self
    }

    /// Build the query. Fails if no center was set or the radius is invalid.
    pub fn build(self) -> Result<GeoQuery> {
        let center = self.center.ok_or_else(|| {
            GeoQueryError::InvalidArgument("A geo query needs a center".to_string())
        })?;
        let config = QueryConfig::new(center, self.radius_meters)?;
        Ok(GeoQuery::new(config, self.store, self.dispatcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualDispatcher;
    use crate::query::QueryPhase;
    use crate::store::MemoryStore;

    fn builder() -> GeoQueryBuilder {
        GeoQueryBuilder::new(Arc::new(MemoryStore::new()), Arc::new(ManualDispatcher::new()))
    }

    #[test]
    fn test_builder_requires_center() {
        let err = builder().radius_km(1.0).build().unwrap_err();
        assert!(matches!(err, GeoQueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_builder_units() {
        let center = Location::new(10.0, 20.0).unwrap();
        let query = builder().center(center).radius_meters(250.0).build().unwrap();
        assert_eq!(query.radius(), 250.0);
        assert_eq!(query.radius_km(), 0.25);
        assert_eq!(query.center(), center);
        assert_eq!(query.phase(), QueryPhase::Idle);
    }

    #[test]
    fn test_builder_from_config() {
        let center = Location::new(-33.86, 151.21).unwrap();
        let config = QueryConfig::with_radius_km(center, 20_000.0).unwrap();
        let query = builder().config(config).build().unwrap();
        assert_eq!(query.radius_km(), 8587.0);
    }

    #[test]
    fn test_builder_rejects_negative_radius() {
        let center = Location::new(0.0, 0.0).unwrap();
        assert!(builder().center(center).radius_meters(-5.0).build().is_err());
    }
}

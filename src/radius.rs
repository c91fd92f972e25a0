//! Search for the smallest radius that holds enough keys.

use crate::compute::validation::validate_radius;
use crate::config::MAX_SUPPORTED_RADIUS_KM;
use crate::error::{GeoQueryError, Result, StoreError};
use crate::index::GeoIndex;
use crate::query::{EventSender, QueryEvent};
use crossbeam_channel::{RecvTimeoutError, unbounded};
use geoquery_types::Location;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Grows a query radius until a minimum number of keys are inside.
///
/// Each step opens a live query and waits for its listener events, so the
/// index must use a dispatcher that runs jobs on its own, such as
/// [`ThreadDispatcher`](crate::dispatch::ThreadDispatcher).
pub struct RadiusFinder {
    index: GeoIndex,
    timeout: Duration,
}

impl RadiusFinder {
    pub const DEFAULT_GROW_FACTOR: f64 = 2.0;

    pub fn new(index: GeoIndex) -> Self {
        Self {
            index,
            timeout: Duration::from_secs(30),
        }
    }

    /// How long to wait for one query to become ready.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Find a radius in kilometers with at least `min_results` keys inside,
    /// starting at `start_radius_km` and multiplying by `grow_factor` after
    /// each miss.
    ///
    /// Returns the maximum supported radius if even that holds fewer keys.
    pub fn radius_with_results(
        &self,
        min_results: usize,
        start_radius_km: f64,
        grow_factor: f64,
        center: Location,
    ) -> Result<f64> {
        validate_radius(start_radius_km)?;
        if start_radius_km == 0.0 {
            return Err(GeoQueryError::InvalidArgument(
                "Start radius must be positive".to_string(),
            ));
        }
        if !grow_factor.is_finite() || grow_factor <= 1.0 {
            return Err(GeoQueryError::InvalidArgument(format!(
                "Grow factor must be greater than 1, got {}",
                grow_factor
            )));
        }

        let mut radius = start_radius_km.min(MAX_SUPPORTED_RADIUS_KM);
        loop {
            let found = self.count_inside(center, radius, min_results)?;
            log::debug!("Radius {}km holds {} keys", radius, found);
            if found >= min_results {
                return Ok(radius);
            }
            if radius >= MAX_SUPPORTED_RADIUS_KM {
                log::warn!(
                    "Only {} of {} keys within the maximum radius of {}km",
                    found,
                    min_results,
                    MAX_SUPPORTED_RADIUS_KM
                );
                return Ok(radius);
            }
            radius = (radius * grow_factor).min(MAX_SUPPORTED_RADIUS_KM);
        }
    }

    /// Count keys inside the circle once the query is ready, stopping early
    /// once `enough` have entered.
    fn count_inside(&self, center: Location, radius_km: f64, enough: usize) -> Result<usize> {
        let query = self.index.query_at_location(center, radius_km)?;
        let (tx, rx) = unbounded();
        query.add_data_listener(Arc::new(EventSender::new(tx)))?;

        let deadline = Instant::now() + self.timeout;
        let mut inside = FxHashSet::default();
        let outcome = loop {
            if inside.len() >= enough {
                break Ok(inside.len());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(QueryEvent::Entered { key, .. }) => {
                    inside.insert(key);
                }
                Ok(QueryEvent::Exited { key, .. }) => {
                    inside.remove(&key);
                }
                Ok(QueryEvent::Ready) => break Ok(inside.len()),
                Ok(QueryEvent::Error(e)) => break Err(e),
                Ok(QueryEvent::Moved { .. } | QueryEvent::Changed { .. }) => {}
                Err(RecvTimeoutError::Timeout) => {
                    break Err(GeoQueryError::Store(StoreError::Other(format!(
                        "Query at {} with radius {}km was not ready within {:?}",
                        center, radius_km, self.timeout
                    ))));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(GeoQueryError::Logic(
                        "Query listener disconnected before ready".to_string(),
                    ));
                }
            }
        };
        query.remove_all_listeners();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ThreadDispatcher;
    use crate::store::MemoryStore;

    fn finder() -> (RadiusFinder, GeoIndex) {
        let index = GeoIndex::new(Arc::new(MemoryStore::new()), Arc::new(ThreadDispatcher::new()));
        let finder = RadiusFinder::new(index.clone()).with_timeout(Duration::from_secs(10));
        (finder, index)
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let (finder, _) = finder();
        let center = Location::new(0.0, 0.0).unwrap();
        assert!(finder.radius_with_results(1, 1.0, 1.0, center).is_err());
        assert!(finder.radius_with_results(1, 1.0, 0.5, center).is_err());
        assert!(finder.radius_with_results(1, 0.0, 2.0, center).is_err());
        assert!(finder.radius_with_results(1, -3.0, 2.0, center).is_err());
    }

    #[test]
    fn test_grows_until_enough_keys() {
        let (finder, index) = finder();
        let center = Location::new(37.0, -122.0).unwrap();
        index.set_location("near", Location::new(37.0005, -122.0).unwrap()).unwrap();
        index.set_location("mid", Location::new(37.05, -122.0).unwrap()).unwrap();
        index.set_location("far", Location::new(38.0, -122.0).unwrap()).unwrap();

        assert_eq!(finder.radius_with_results(1, 1.0, 2.0, center).unwrap(), 1.0);
        // "mid" is about 5.5km away.
        assert_eq!(finder.radius_with_results(2, 1.0, 2.0, center).unwrap(), 8.0);
        // "far" is about 111km away.
        assert_eq!(finder.radius_with_results(3, 1.0, 2.0, center).unwrap(), 128.0);
    }

    #[test]
    fn test_stops_at_max_radius() {
        let (finder, index) = finder();
        let center = Location::new(10.0, 10.0).unwrap();
        index.set_location("only", center).unwrap();
        let radius = finder.radius_with_results(2, 4000.0, 2.0, center).unwrap();
        assert_eq!(radius, MAX_SUPPORTED_RADIUS_KM);
    }
}

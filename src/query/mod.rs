//! Live radius queries.
//!
//! A [`GeoQuery`] keeps a set of store subscriptions, one per sub-range of
//! the circle's geohash decomposition, and turns their add/change/remove
//! notifications into `entered`/`exited`/`moved`/`changed`/`ready` events for
//! its listeners.
//!
//! All state lives behind one lock. Store notifications, listener
//! registration, and reconfiguration each take it for the whole operation.
//! Listener callbacks never run under it: they are handed to the query's
//! [`Dispatcher`], which runs them in order on its own schedule.

pub mod listener;
mod state;

pub use listener::{
    EventSender, GeoQueryDataEventListener, GeoQueryEventListener, ListenerId, QueryEvent,
};
pub use state::QueryPhase;

use crate::compute::geohash::GeoHash;
use crate::compute::ranges::{SubRange, queries_at_location};
use crate::config::{KILOMETER_TO_METER, QueryConfig};
use crate::dispatch::Dispatcher;
use crate::error::{GeoQueryError, Result, StoreError};
use crate::store::{LocationRecord, LocationStore, RangeObserver};
use geoquery_types::Location;
use parking_lot::Mutex;
use listener::EventListenerBridge;
use state::{ActiveRange, EventBatch, QueryState, Registration};
use std::fmt;
use std::sync::{Arc, Weak};

/// A live query for keys within a radius of a center point.
///
/// Cloning yields another handle to the same query. Subscriptions are
/// cancelled when the last handle is dropped.
///
/// # Examples
///
/// ```rust
/// use geoquery::prelude::*;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let dispatcher = Arc::new(ManualDispatcher::new());
/// let center = Location::new(37.0, -122.0)?;
///
/// store.write("bike-7", LocationRecord::new(&Location::new(37.0001, -122.0001)?))?;
///
/// let query = GeoQuery::new(QueryConfig::new(center, 500.0)?, store.clone(), dispatcher.clone());
/// let (tx, rx) = crossbeam_channel::unbounded();
/// query.add_data_listener(Arc::new(EventSender::new(tx)))?;
///
/// store.flush();
/// dispatcher.run_pending();
///
/// let events: Vec<QueryEvent> = rx.try_iter().collect();
/// assert!(matches!(&events[0], QueryEvent::Entered { key, .. } if key == "bike-7"));
/// assert!(matches!(events[1], QueryEvent::Ready));
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
#[derive(Clone)]
pub struct GeoQuery {
    shared: Arc<QueryShared>,
}

struct QueryShared {
    state: Mutex<QueryState>,
    store: Arc<dyn LocationStore>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl GeoQuery {
    /// Create an idle query. Nothing is subscribed until the first listener is added.
    pub fn new(
        config: QueryConfig,
        store: Arc<dyn LocationStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let shared = QueryShared {
            state: Mutex::new(QueryState::new(config.center, config.radius_meters)),
            store,
            dispatcher,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn center(&self) -> Location {
        self.shared.state.lock().center
    }

    /// Radius in meters.
    pub fn radius(&self) -> f64 {
        self.shared.state.lock().radius
    }

    pub fn radius_km(&self) -> f64 {
        self.radius() / KILOMETER_TO_METER
    }

    pub fn phase(&self) -> QueryPhase {
        self.shared.state.lock().phase()
    }

    /// The sub-ranges currently subscribed, sorted. Empty while idle.
    pub fn sub_ranges(&self) -> Vec<SubRange> {
        self.shared.state.lock().ranges.iter().cloned().collect()
    }

    /// Number of keys being tracked, inside or outside the circle.
    pub fn tracked_keys(&self) -> usize {
        self.shared.state.lock().locations.len()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().listeners.len()
    }

    /// Register a listener.
    ///
    /// The first listener activates the query. A later listener is brought up
    /// to date with `entered` for every key already inside, followed by
    /// `ready` if the query has finished loading.
    pub fn add_listener(&self, listener: Arc<dyn GeoQueryEventListener>) -> Result<ListenerId> {
        let identity = Arc::as_ptr(&listener) as *const () as usize;
        self.register(identity, Arc::new(EventListenerBridge::new(listener)))
    }

    /// Register a listener that also receives each key's stored record.
    pub fn add_data_listener(
        &self,
        listener: Arc<dyn GeoQueryDataEventListener>,
    ) -> Result<ListenerId> {
        let identity = Arc::as_ptr(&listener) as *const () as usize;
        self.register(identity, listener)
    }

    fn register(
        &self,
        identity: usize,
        listener: Arc<dyn GeoQueryDataEventListener>,
    ) -> Result<ListenerId> {
        let mut state = self.shared.state.lock();
        if state.listeners.iter().any(|r| r.identity == identity) {
            return Err(GeoQueryError::InvalidArgument(
                "Added the same listener twice to a geo query".to_string(),
            ));
        }

        let id = ListenerId::new();
        state.listeners.push(Registration {
            id,
            identity,
            listener: Arc::clone(&listener),
        });
        log::debug!("Added {} ({} total)", id, state.listeners.len());

        if state.listeners.len() == 1 {
            if let Err(e) = self.shared.setup_queries(&mut state) {
                state.listeners.clear();
                self.shared.cancel_all(&mut state);
                return Err(e);
            }
        } else {
            let mut events = state.entered_snapshot();
            if state.outstanding.is_empty() {
                events.push(QueryEvent::Ready);
            }
            self.shared.dispatch_to(&listener, events);
        }
        Ok(id)
    }

    /// Unregister a listener. Removing the last one cancels every subscription
    /// and forgets all tracked keys.
    pub fn remove_listener(&self, id: ListenerId) -> Result<()> {
        let mut state = self.shared.state.lock();
        let Some(index) = state.listeners.iter().position(|r| r.id == id) else {
            return Err(GeoQueryError::InvalidArgument(format!(
                "{} is not registered with this geo query",
                id
            )));
        };
        state.listeners.remove(index);
        log::debug!("Removed {} ({} left)", id, state.listeners.len());

        if state.listeners.is_empty() {
            self.shared.cancel_all(&mut state);
        }
        Ok(())
    }

    pub fn remove_all_listeners(&self) {
        let mut state = self.shared.state.lock();
        state.listeners.clear();
        self.shared.cancel_all(&mut state);
    }

    pub fn set_center(&self, center: Location) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.center = center;
        self.shared.reconfigure(&mut state)
    }

    /// Set the radius in meters. Values above the supported maximum are clamped.
    pub fn set_radius(&self, radius_meters: f64) -> Result<()> {
        let radius = QueryConfig::new(self.center(), radius_meters)?.radius_meters;
        let mut state = self.shared.state.lock();
        state.radius = radius;
        self.shared.reconfigure(&mut state)
    }

    pub fn set_radius_km(&self, radius_km: f64) -> Result<()> {
        self.set_radius(radius_km * KILOMETER_TO_METER)
    }

    /// Change center and radius (meters) together, re-decomposing once.
    pub fn set_location(&self, center: Location, radius_meters: f64) -> Result<()> {
        let config = QueryConfig::new(center, radius_meters)?;
        let mut state = self.shared.state.lock();
        state.center = config.center;
        state.radius = config.radius_meters;
        self.shared.reconfigure(&mut state)
    }

    pub fn set_location_km(&self, center: Location, radius_km: f64) -> Result<()> {
        self.set_location(center, radius_km * KILOMETER_TO_METER)
    }
}

impl fmt::Debug for GeoQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("GeoQuery")
            .field("center", &state.center)
            .field("radius", &state.radius)
            .field("phase", &state.phase())
            .field("listeners", &state.listeners.len())
            .field("sub_ranges", &state.ranges.len())
            .field("tracked_keys", &state.locations.len())
            .finish()
    }
}

impl QueryShared {
    /// Re-decompose if the query is active.
    fn reconfigure(self: &Arc<Self>, state: &mut QueryState) -> Result<()> {
        if state.listeners.is_empty() {
            return Ok(());
        }
        self.setup_queries(state)
    }

    fn setup_queries(self: &Arc<Self>, state: &mut QueryState) -> Result<()> {
        let new_ranges = queries_at_location(&state.center, state.radius)?;

        let stale: Vec<SubRange> = state
            .subscriptions
            .keys()
            .filter(|range| !new_ranges.contains(*range))
            .cloned()
            .collect();
        for range in stale {
            if let Some(active) = state.subscriptions.remove(&range) {
                log::debug!("Unsubscribing {} ({})", range, active.id);
                self.store.unsubscribe(active.id);
            }
        }
        state.outstanding.retain(|range| new_ranges.contains(range));
        state.ranges = new_ranges;

        let mut errors = Vec::new();
        let wanted: Vec<SubRange> = state
            .ranges
            .iter()
            .filter(|range| !state.subscriptions.contains_key(*range))
            .cloned()
            .collect();
        for range in wanted {
            state.outstanding.insert(range.clone());
            let token = state.next_token();
            let observer = Arc::new(RangeListener {
                query: Arc::downgrade(self),
                range: range.clone(),
                token,
            });
            match self.store.subscribe_range(&range, observer) {
                Ok(id) => {
                    log::debug!("Subscribed {} as {}", range, id);
                    state.subscriptions.insert(range.clone(), ActiveRange { id, token });
                    let query = Arc::downgrade(self);
                    self.store.on_initial_snapshot(
                        id,
                        Box::new(move |result| {
                            if let Some(shared) = query.upgrade() {
                                shared.handle_snapshot(&range, token, result);
                            }
                        }),
                    );
                }
                Err(e) => {
                    log::warn!("Failed to subscribe {}: {}", range, e);
                    errors.push(QueryEvent::Error(e.into()));
                }
            }
        }

        let mut events = state.reclassify_all();
        state.retain_covered();
        events.extend(errors);
        if state.outstanding.is_empty() {
            events.push(QueryEvent::Ready);
        }

        log::debug!(
            "Query at {} r={}m: {} sub-ranges, {} outstanding, {} tracked",
            state.center,
            state.radius,
            state.ranges.len(),
            state.outstanding.len(),
            state.locations.len()
        );
        self.dispatch_all(state, events);
        Ok(())
    }

    fn cancel_all(&self, state: &mut QueryState) {
        let ids = state.reset();
        if !ids.is_empty() {
            log::debug!("Cancelling {} subscriptions", ids.len());
        }
        for id in ids {
            self.store.unsubscribe(id);
        }
    }

    fn handle_snapshot(&self, range: &SubRange, token: u64, result: std::result::Result<(), StoreError>) {
        let mut state = self.state.lock();
        if !state.is_current(range, token) {
            log::warn!("Ignoring snapshot for stale sub-range {}", range);
            return;
        }
        match result {
            Ok(()) => {
                if state.outstanding.remove(range) && state.outstanding.is_empty() {
                    self.dispatch_all(&state, [QueryEvent::Ready]);
                }
            }
            Err(e) => {
                log::warn!("Initial data for {} failed: {}", range, e);
                self.dispatch_all(&state, [QueryEvent::Error(e.into())]);
            }
        }
    }

    fn handle_record(&self, range: &SubRange, token: u64, key: &str, record: &LocationRecord) {
        let mut state = self.state.lock();
        if !state.is_current(range, token) {
            log::warn!("Ignoring update of {} from stale sub-range {}", key, range);
            return;
        }
        let events: EventBatch = match record.location() {
            Some(location) => state.update_location(key, location, record),
            None => {
                log::error!("Record {} has no valid location: {:?}", key, record.l);
                EventBatch::from_iter([QueryEvent::Error(GeoQueryError::Logic(format!(
                    "record {} has no valid location",
                    key
                )))])
            }
        };
        self.dispatch_all(&state, events);
    }

    fn handle_removed(self: &Arc<Self>, range: &SubRange, token: u64, key: &str) {
        let state = self.state.lock();
        if !state.is_current(range, token) {
            log::warn!("Ignoring removal of {} from stale sub-range {}", key, range);
            return;
        }
        if !state.locations.contains_key(key) {
            return;
        }

        // A removal from one range may just be a move into another, so
        // re-read the record before deciding.
        let query = Arc::downgrade(self);
        let owned_key = key.to_string();
        self.store.point_read(
            key,
            Box::new(move |result| {
                if let Some(shared) = query.upgrade() {
                    shared.handle_point_read(&owned_key, result);
                }
            }),
        );
    }

    fn handle_point_read(
        &self,
        key: &str,
        result: std::result::Result<Option<LocationRecord>, StoreError>,
    ) {
        let mut state = self.state.lock();
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Re-reading {} failed: {}", key, e);
                self.dispatch_all(&state, [QueryEvent::Error(e.into())]);
                return;
            }
        };

        let still_covered = record
            .as_ref()
            .and_then(LocationRecord::location)
            .is_some_and(|location| state.is_covered(&GeoHash::new(&location)));
        if still_covered {
            return;
        }
        if let Some(event) = state.forget(key) {
            self.dispatch_all(&state, [event]);
        }
    }

    fn handle_error(&self, range: &SubRange, token: u64, error: StoreError) {
        let state = self.state.lock();
        if !state.is_current(range, token) {
            return;
        }
        log::warn!("Subscription for {} failed: {}", range, error);
        self.dispatch_all(&state, [QueryEvent::Error(error.into())]);
    }

    /// Queue `events` for every registered listener. Each listener gets one
    /// job so its events stay together and in order.
    fn dispatch_all(&self, state: &QueryState, events: impl IntoIterator<Item = QueryEvent>) {
        let events: Vec<QueryEvent> = events.into_iter().collect();
        if events.is_empty() {
            return;
        }
        for registration in &state.listeners {
            self.dispatch_to(&registration.listener, events.clone());
        }
    }

    fn dispatch_to(&self, listener: &Arc<dyn GeoQueryDataEventListener>, events: Vec<QueryEvent>) {
        if events.is_empty() {
            return;
        }
        let listener = Arc::clone(listener);
        self.dispatcher.dispatch(Box::new(move || {
            for event in &events {
                event.deliver_to(listener.as_ref());
            }
        }));
    }
}

impl Drop for QueryShared {
    fn drop(&mut self) {
        let ids = self.state.get_mut().reset();
        for id in ids {
            self.store.unsubscribe(id);
        }
    }
}

/// Store observer for one sub-range of one generation.
struct RangeListener {
    query: Weak<QueryShared>,
    range: SubRange,
    token: u64,
}

impl RangeObserver for RangeListener {
    fn on_added(&self, key: &str, record: &LocationRecord) {
        if let Some(shared) = self.query.upgrade() {
            shared.handle_record(&self.range, self.token, key, record);
        }
    }

    fn on_changed(&self, key: &str, record: &LocationRecord) {
        if let Some(shared) = self.query.upgrade() {
            shared.handle_record(&self.range, self.token, key, record);
        }
    }

    fn on_removed(&self, key: &str) {
        if let Some(shared) = self.query.upgrade() {
            shared.handle_removed(&self.range, self.token, key);
        }
    }

    fn on_error(&self, error: StoreError) {
        if let Some(shared) = self.query.upgrade() {
            shared.handle_error(&self.range, self.token, error);
        }
    }
}

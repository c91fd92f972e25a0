//! In-memory backing store with live range subscriptions.
//!
//! Records are kept in a `BTreeMap` keyed by record key, plus an ordered
//! `(geohash, key)` index used for range scans. Notifications are delivered
//! in order on a dedicated notifier thread, which mimics a remote store whose
//! callbacks arrive on a thread the caller does not own.

use super::{
    LocationRecord, LocationStore, PointReadCallback, RangeObserver, SnapshotCallback,
    SubscriptionId,
};
use crate::compute::ranges::SubRange;
use crate::error::StoreError;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Counters describing store activity.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreStats {
    /// Number of records currently stored
    pub record_count: usize,
    /// Number of live range subscriptions
    pub active_subscriptions: usize,
    /// Writes and deletes applied
    pub operations_count: u64,
    /// Notifications queued for delivery
    pub notifications_queued: u64,
}

struct Subscription {
    range: SubRange,
    observer: Arc<dyn RangeObserver>,
    failure: Option<StoreError>,
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<String, LocationRecord>,
    by_geohash: BTreeSet<(String, String)>,
    subscriptions: FxHashMap<SubscriptionId, Subscription>,
    subscription_failure: Option<StoreError>,
    stats: MemoryStoreStats,
}

impl MemoryState {
    fn is_live(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.contains_key(id)
    }

    fn keys_in_range(&self, range: &SubRange) -> Vec<(String, LocationRecord)> {
        let lower = Bound::Included((range.start().to_string(), String::new()));
        let upper = Bound::Excluded((range.end().to_string(), String::new()));
        self.by_geohash
            .range((lower, upper))
            .filter_map(|(_, key)| self.records.get(key).map(|r| (key.clone(), r.clone())))
            .collect()
    }
}

enum Notification {
    Added {
        id: SubscriptionId,
        observer: Arc<dyn RangeObserver>,
        key: String,
        record: LocationRecord,
    },
    Changed {
        id: SubscriptionId,
        observer: Arc<dyn RangeObserver>,
        key: String,
        record: LocationRecord,
    },
    Removed {
        id: SubscriptionId,
        observer: Arc<dyn RangeObserver>,
        key: String,
    },
    Error {
        id: SubscriptionId,
        observer: Arc<dyn RangeObserver>,
        error: StoreError,
    },
    Snapshot {
        id: SubscriptionId,
        result: Result<(), StoreError>,
        done: SnapshotCallback,
    },
    PointRead {
        record: Option<LocationRecord>,
        done: PointReadCallback,
    },
    Barrier(Sender<bool>),
}

/// In-memory [`LocationStore`].
///
/// # Examples
///
/// ```rust
/// use geoquery::store::{LocationRecord, LocationStore, MemoryStore};
/// use geoquery_types::Location;
///
/// let store = MemoryStore::new();
/// let location = Location::new(37.0, -122.0).unwrap();
/// store.write("truck-1", LocationRecord::new(&location)).unwrap();
/// assert_eq!(store.get("truck-1").unwrap().location(), Some(location));
/// ```
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    tx: Option<Sender<Notification>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl MemoryStore {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        let (tx, rx) = unbounded::<Notification>();

        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("geoquery-memory-store".to_string())
            .spawn(move || notifier_loop(worker_state, rx))
            .expect("failed to spawn memory store notifier");
        let worker_id = worker.thread().id();

        Self {
            state,
            tx: Some(tx),
            worker: Some(worker),
            worker_id,
        }
    }

    /// Synchronous read of a record, bypassing the notifier.
    pub fn get(&self, key: &str) -> Option<LocationRecord> {
        self.state.lock().records.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.record_count = state.records.len();
        stats.active_subscriptions = state.subscriptions.len();
        stats
    }

    /// Make every subsequent subscription fail its initial snapshot with `error`.
    /// Pass `None` to restore normal behaviour.
    pub fn fail_subscriptions(&self, error: Option<StoreError>) {
        self.state.lock().subscription_failure = error;
    }

    /// Report `error` on every live subscription, as a remote store would when
    /// access is revoked.
    pub fn fail_active_subscriptions(&self, error: StoreError) {
        let mut state = self.state.lock();
        let notifications: Vec<_> = state
            .subscriptions
            .iter()
            .map(|(id, sub)| Notification::Error {
                id: *id,
                observer: Arc::clone(&sub.observer),
                error: error.clone(),
            })
            .collect();
        for notification in notifications {
            self.enqueue(&mut state, notification);
        }
    }

    /// Block until every queued notification, including ones queued while
    /// flushing, has been delivered. Must not be called from an observer.
    pub fn flush(&self) {
        if thread::current().id() == self.worker_id {
            log::warn!("MemoryStore::flush called from the notifier thread; ignoring");
            return;
        }
        let Some(tx) = &self.tx else { return };
        loop {
            let (reply_tx, reply_rx) = bounded(1);
            if tx.send(Notification::Barrier(reply_tx)).is_err() {
                return;
            }
            match reply_rx.recv() {
                Ok(true) | Err(_) => return,
                Ok(false) => continue,
            }
        }
    }

    fn enqueue(&self, state: &mut MemoryState, notification: Notification) {
        if let Some(tx) = &self.tx {
            state.stats.notifications_queued += 1;
            if tx.send(notification).is_err() {
                log::warn!("Memory store notifier has stopped; dropping notification");
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        // Closing the channel ends the notifier loop.
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && thread::current().id() != self.worker_id
        {
            let _ = worker.join();
        }
    }
}

impl LocationStore for MemoryStore {
    fn subscribe_range(
        &self,
        range: &SubRange,
        observer: Arc<dyn RangeObserver>,
    ) -> Result<SubscriptionId, StoreError> {
        if self.tx.is_none() {
            return Err(StoreError::Disconnected);
        }
        let id = SubscriptionId::new();
        let mut state = self.state.lock();
        let failure = state.subscription_failure.clone();

        if failure.is_none() {
            for (key, record) in state.keys_in_range(range) {
                let notification = Notification::Added {
                    id,
                    observer: Arc::clone(&observer),
                    key,
                    record,
                };
                self.enqueue(&mut state, notification);
            }
        }

        log::debug!("Subscribed {} to range {}", id, range);
        state.subscriptions.insert(
            id,
            Subscription {
                range: range.clone(),
                observer,
                failure,
            },
        );
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.state.lock().subscriptions.remove(&id).is_some() {
            log::debug!("Unsubscribed {}", id);
        }
    }

    fn on_initial_snapshot(&self, id: SubscriptionId, done: SnapshotCallback) {
        let mut state = self.state.lock();
        let result = match state.subscriptions.get(&id) {
            Some(sub) => match &sub.failure {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            },
            None => {
                log::debug!("Snapshot requested for unknown subscription {}", id);
                return;
            }
        };
        self.enqueue(&mut state, Notification::Snapshot { id, result, done });
    }

    fn point_read(&self, key: &str, done: PointReadCallback) {
        let mut state = self.state.lock();
        let record = state.records.get(key).cloned();
        self.enqueue(&mut state, Notification::PointRead { record, done });
    }

    fn write(&self, key: &str, record: LocationRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let old = state.records.insert(key.to_string(), record.clone());
        if let Some(old) = &old {
            state.by_geohash.remove(&(old.g.clone(), key.to_string()));
        }
        state.by_geohash.insert((record.g.clone(), key.to_string()));
        state.stats.operations_count += 1;

        let mut notifications = Vec::new();
        for (id, sub) in state.subscriptions.iter() {
            if sub.failure.is_some() {
                continue;
            }
            let was_in = old.as_ref().is_some_and(|o| sub.range.contains(&o.g));
            let now_in = sub.range.contains(&record.g);
            let observer = Arc::clone(&sub.observer);
            let key = key.to_string();
            match (was_in, now_in) {
                (false, true) => notifications.push(Notification::Added {
                    id: *id,
                    observer,
                    key,
                    record: record.clone(),
                }),
                (true, true) => notifications.push(Notification::Changed {
                    id: *id,
                    observer,
                    key,
                    record: record.clone(),
                }),
                (true, false) => notifications.push(Notification::Removed {
                    id: *id,
                    observer,
                    key,
                }),
                (false, false) => {}
            }
        }
        for notification in notifications {
            self.enqueue(&mut state, notification);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let Some(old) = state.records.remove(key) else {
            return Ok(());
        };
        state.by_geohash.remove(&(old.g.clone(), key.to_string()));
        state.stats.operations_count += 1;

        let notifications: Vec<_> = state
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.failure.is_none() && sub.range.contains(&old.g))
            .map(|(id, sub)| Notification::Removed {
                id: *id,
                observer: Arc::clone(&sub.observer),
                key: key.to_string(),
            })
            .collect();
        for notification in notifications {
            self.enqueue(&mut state, notification);
        }
        Ok(())
    }
}

fn notifier_loop(state: Arc<Mutex<MemoryState>>, rx: Receiver<Notification>) {
    for notification in rx.iter() {
        match notification {
            Notification::Added {
                id,
                observer,
                key,
                record,
            } => {
                if state.lock().is_live(&id) {
                    observer.on_added(&key, &record);
                }
            }
            Notification::Changed {
                id,
                observer,
                key,
                record,
            } => {
                if state.lock().is_live(&id) {
                    observer.on_changed(&key, &record);
                }
            }
            Notification::Removed { id, observer, key } => {
                if state.lock().is_live(&id) {
                    observer.on_removed(&key);
                }
            }
            Notification::Error {
                id,
                observer,
                error,
            } => {
                if state.lock().is_live(&id) {
                    observer.on_error(error);
                }
            }
            Notification::Snapshot { id, result, done } => {
                if state.lock().is_live(&id) {
                    done(result);
                }
            }
            Notification::PointRead { record, done } => done(Ok(record)),
            Notification::Barrier(reply) => {
                let _ = reply.send(rx.is_empty());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_types::Location;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl RangeObserver for Recorder {
        fn on_added(&self, key: &str, _record: &LocationRecord) {
            self.events.lock().push(format!("added {}", key));
        }

        fn on_changed(&self, key: &str, _record: &LocationRecord) {
            self.events.lock().push(format!("changed {}", key));
        }

        fn on_removed(&self, key: &str) {
            self.events.lock().push(format!("removed {}", key));
        }

        fn on_error(&self, error: StoreError) {
            self.events.lock().push(format!("error {}", error));
        }
    }

    fn record(lat: f64, lon: f64) -> LocationRecord {
        LocationRecord::new(&Location::new(lat, lon).unwrap())
    }

    #[test]
    fn test_backlog_then_snapshot() {
        let store = MemoryStore::new();
        store.write("in", record(37.0, -122.0)).unwrap();
        store.write("out", record(-33.0, 151.0)).unwrap();

        let recorder = Arc::new(Recorder::default());
        let range = SubRange::new("9", "9~");
        let id = store.subscribe_range(&range, recorder.clone()).unwrap();

        let done = Arc::new(Mutex::new(None));
        let done_clone = Arc::clone(&done);
        store.on_initial_snapshot(
            id,
            Box::new(move |result| {
                *done_clone.lock() = Some(result);
            }),
        );
        store.flush();

        assert_eq!(recorder.take(), vec!["added in".to_string()]);
        assert_eq!(*done.lock(), Some(Ok(())));
    }

    #[test]
    fn test_write_moves_between_ranges() {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store
            .subscribe_range(&SubRange::new("9", "9~"), recorder.clone())
            .unwrap();

        store.write("k", record(37.0, -122.0)).unwrap();
        store.write("k", record(37.0001, -122.0)).unwrap();
        store.write("k", record(0.0, 0.0)).unwrap();
        store.write("k", record(37.0, -122.0)).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        store.flush();

        assert_eq!(
            recorder.take(),
            vec!["added k", "changed k", "removed k", "added k", "removed k"]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        let id = store
            .subscribe_range(&SubRange::new("0", "~"), recorder.clone())
            .unwrap();
        store.unsubscribe(id);
        store.write("k", record(1.0, 1.0)).unwrap();
        store.flush();
        assert!(recorder.take().is_empty());
        assert_eq!(store.stats().active_subscriptions, 0);
    }

    #[test]
    fn test_point_read() {
        let store = MemoryStore::new();
        store.write("k", record(1.0, 2.0)).unwrap();

        let (tx, rx) = unbounded();
        let tx2 = tx.clone();
        store.point_read("k", Box::new(move |r| tx.send(r).unwrap()));
        store.point_read("missing", Box::new(move |r| tx2.send(r).unwrap()));

        let first = rx.recv().unwrap().unwrap().unwrap();
        assert_eq!(first.location(), Some(Location::new(1.0, 2.0).unwrap()));
        assert_eq!(rx.recv().unwrap(), Ok(None));
    }

    #[test]
    fn test_failed_subscription_reports_on_snapshot() {
        let store = MemoryStore::new();
        store.write("k", record(37.0, -122.0)).unwrap();
        store.fail_subscriptions(Some(StoreError::PermissionDenied("geo".into())));

        let recorder = Arc::new(Recorder::default());
        let id = store
            .subscribe_range(&SubRange::new("9", "9~"), recorder.clone())
            .unwrap();
        let (tx, rx) = unbounded();
        store.on_initial_snapshot(id, Box::new(move |r| tx.send(r).unwrap()));

        assert_eq!(
            rx.recv().unwrap(),
            Err(StoreError::PermissionDenied("geo".into()))
        );
        store.flush();
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_fail_active_subscriptions() {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store
            .subscribe_range(&SubRange::new("0", "~"), recorder.clone())
            .unwrap();
        store.fail_active_subscriptions(StoreError::Disconnected);
        store.flush();
        assert_eq!(recorder.take(), vec!["error Store disconnected"]);
    }

    #[test]
    fn test_stats() {
        let store = MemoryStore::new();
        store.write("a", record(1.0, 1.0)).unwrap();
        store.write("b", record(2.0, 2.0)).unwrap();
        store.delete("a").unwrap();
        let stats = store.stats();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.operations_count, 3);
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}

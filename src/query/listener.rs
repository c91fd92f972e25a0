//! Listener traits and the events delivered through them.

use crate::error::GeoQueryError;
use crate::store::LocationRecord;
use crossbeam_channel::Sender;
use geoquery_types::Location;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Receives the events of a live query, with the full stored record of each key.
///
/// Callbacks run on the query's dispatcher, one at a time and in order, so an
/// implementation needs no synchronization of its own beyond `Send + Sync`.
pub trait GeoQueryDataEventListener: Send + Sync {
    /// `key` is now inside the circle.
    fn on_data_entered(&self, key: &str, record: &LocationRecord, location: Location);

    /// `key` left the circle or was deleted. `record` is the last one seen.
    fn on_data_exited(&self, key: &str, record: &LocationRecord);

    /// `key` is still inside the circle but at a new location.
    fn on_data_moved(&self, key: &str, record: &LocationRecord, location: Location);

    /// `key` is inside the circle and its record was rewritten, whether or not
    /// the location changed. Follows `on_data_moved` when both apply.
    fn on_data_changed(&self, key: &str, record: &LocationRecord, location: Location);

    /// Every sub-range of the current configuration has delivered its initial data.
    fn on_query_ready(&self);

    /// The backing store reported an error. Query state is left unchanged.
    fn on_query_error(&self, error: &GeoQueryError) {
        log::warn!("Unhandled geo query error: {}", error);
    }
}

/// Receives the events of a live query as keys and locations only.
pub trait GeoQueryEventListener: Send + Sync {
    /// `key` is now inside the circle.
    fn on_key_entered(&self, key: &str, location: Location);

    /// `key` left the circle or was deleted.
    fn on_key_exited(&self, key: &str);

    /// `key` is still inside the circle but at a new location.
    fn on_key_moved(&self, key: &str, location: Location);

    /// `key` is inside the circle and its record was rewritten.
    fn on_key_changed(&self, _key: &str, _location: Location) {}

    fn on_query_ready(&self);

    fn on_query_error(&self, error: &GeoQueryError) {
        log::warn!("Unhandled geo query error: {}", error);
    }
}

/// Adapts a [`GeoQueryEventListener`] to the record-carrying interface by
/// dropping the records.
pub(crate) struct EventListenerBridge {
    inner: Arc<dyn GeoQueryEventListener>,
}

impl EventListenerBridge {
    pub(crate) fn new(inner: Arc<dyn GeoQueryEventListener>) -> Self {
        Self { inner }
    }
}

impl GeoQueryDataEventListener for EventListenerBridge {
    fn on_data_entered(&self, key: &str, _record: &LocationRecord, location: Location) {
        self.inner.on_key_entered(key, location);
    }

    fn on_data_exited(&self, key: &str, _record: &LocationRecord) {
        self.inner.on_key_exited(key);
    }

    fn on_data_moved(&self, key: &str, _record: &LocationRecord, location: Location) {
        self.inner.on_key_moved(key, location);
    }

    fn on_data_changed(&self, key: &str, _record: &LocationRecord, location: Location) {
        self.inner.on_key_changed(key, location);
    }

    fn on_query_ready(&self) {
        self.inner.on_query_ready();
    }

    fn on_query_error(&self, error: &GeoQueryError) {
        self.inner.on_query_error(error);
    }
}

/// Handle returned by `GeoQuery::add_listener`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// An application-level query event.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    Entered {
        key: String,
        location: Location,
        record: LocationRecord,
    },
    Exited {
        key: String,
        record: LocationRecord,
    },
    Moved {
        key: String,
        location: Location,
        record: LocationRecord,
    },
    Changed {
        key: String,
        location: Location,
        record: LocationRecord,
    },
    Ready,
    Error(GeoQueryError),
}

impl QueryEvent {
    /// Invoke the matching callback on `listener`.
    pub fn deliver_to(&self, listener: &dyn GeoQueryDataEventListener) {
        match self {
            QueryEvent::Entered {
                key,
                location,
                record,
            } => listener.on_data_entered(key, record, *location),
            QueryEvent::Exited { key, record } => listener.on_data_exited(key, record),
            QueryEvent::Moved {
                key,
                location,
                record,
            } => listener.on_data_moved(key, record, *location),
            QueryEvent::Changed {
                key,
                location,
                record,
            } => listener.on_data_changed(key, record, *location),
            QueryEvent::Ready => listener.on_query_ready(),
            QueryEvent::Error(error) => listener.on_query_error(error),
        }
    }

    /// The record key this event concerns, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            QueryEvent::Entered { key, .. }
            | QueryEvent::Exited { key, .. }
            | QueryEvent::Moved { key, .. }
            | QueryEvent::Changed { key, .. } => Some(key),
            QueryEvent::Ready | QueryEvent::Error(_) => None,
        }
    }

    /// The stored record this event carries, if any.
    pub fn record(&self) -> Option<&LocationRecord> {
        match self {
            QueryEvent::Entered { record, .. }
            | QueryEvent::Exited { record, .. }
            | QueryEvent::Moved { record, .. }
            | QueryEvent::Changed { record, .. } => Some(record),
            QueryEvent::Ready | QueryEvent::Error(_) => None,
        }
    }
}

impl fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryEvent::Entered { key, location, .. } => write!(
                f,
                "entered {} ({}, {})",
                key,
                location.latitude(),
                location.longitude()
            ),
            QueryEvent::Exited { key, .. } => write!(f, "exited {}", key),
            QueryEvent::Moved { key, location, .. } => write!(
                f,
                "moved {} ({}, {})",
                key,
                location.latitude(),
                location.longitude()
            ),
            QueryEvent::Changed { key, location, .. } => write!(
                f,
                "changed {} ({}, {})",
                key,
                location.latitude(),
                location.longitude()
            ),
            QueryEvent::Ready => write!(f, "ready"),
            QueryEvent::Error(error) => write!(f, "error {}", error),
        }
    }
}

/// Listener that forwards every event, records included, into a channel.
///
/// ```rust
/// use geoquery::query::{EventSender, QueryEvent, GeoQueryDataEventListener};
///
/// let (tx, rx) = crossbeam_channel::unbounded();
/// let listener = EventSender::new(tx);
/// listener.on_query_ready();
/// assert!(matches!(rx.recv().unwrap(), QueryEvent::Ready));
/// ```
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<QueryEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<QueryEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: QueryEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl GeoQueryDataEventListener for EventSender {
    fn on_data_entered(&self, key: &str, record: &LocationRecord, location: Location) {
        self.send(QueryEvent::Entered {
            key: key.to_string(),
            location,
            record: record.clone(),
        });
    }

    fn on_data_exited(&self, key: &str, record: &LocationRecord) {
        self.send(QueryEvent::Exited {
            key: key.to_string(),
            record: record.clone(),
        });
    }

    fn on_data_moved(&self, key: &str, record: &LocationRecord, location: Location) {
        self.send(QueryEvent::Moved {
            key: key.to_string(),
            location,
            record: record.clone(),
        });
    }

    fn on_data_changed(&self, key: &str, record: &LocationRecord, location: Location) {
        self.send(QueryEvent::Changed {
            key: key.to_string(),
            location,
            record: record.clone(),
        });
    }

    fn on_query_ready(&self) {
        self.send(QueryEvent::Ready);
    }

    fn on_query_error(&self, error: &GeoQueryError) {
        self.send(QueryEvent::Error(error.clone()));
    }
}

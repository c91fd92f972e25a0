//! Per-query bookkeeping and event classification.
//!
//! Nothing in here talks to the store or the dispatcher. The engine holds a
//! [`QueryState`] behind its lock, mutates it in response to store
//! notifications, and dispatches whatever events these methods return.

use super::listener::{GeoQueryDataEventListener, ListenerId, QueryEvent};
use crate::compute::geo_utils::distance;
use crate::compute::geohash::GeoHash;
use crate::compute::ranges::SubRange;
use crate::store::{LocationRecord, SubscriptionId};
use geoquery_types::Location;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Events produced by one notification, in delivery order.
pub(crate) type EventBatch = SmallVec<[QueryEvent; 2]>;

/// Lifecycle phase of a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryPhase {
    /// No listeners and no store subscriptions.
    Idle,
    /// At least one sub-range has not delivered its initial data yet.
    Loading,
    /// Every sub-range of the current configuration has delivered its initial data.
    Ready,
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPhase::Idle => write!(f, "idle"),
            QueryPhase::Loading => write!(f, "loading"),
            QueryPhase::Ready => write!(f, "ready"),
        }
    }
}

/// Last known state of one tracked key.
#[derive(Debug, Clone)]
pub(crate) struct LocationInfo {
    pub location: Location,
    pub inside: bool,
    pub geohash: GeoHash,
    pub record: LocationRecord,
}

/// A registered listener. `identity` is the address of the object the
/// caller registered, used to reject duplicates.
pub(crate) struct Registration {
    pub id: ListenerId,
    pub identity: usize,
    pub listener: Arc<dyn GeoQueryDataEventListener>,
}

/// A live store subscription for one sub-range.
///
/// `token` identifies the generation that created the subscription so that
/// notifications from an older subscription of the same range are ignored.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveRange {
    pub id: SubscriptionId,
    pub token: u64,
}

pub(crate) struct QueryState {
    pub center: Location,
    /// Radius in meters, already capped.
    pub radius: f64,
    pub listeners: Vec<Registration>,
    /// Sub-ranges of the current decomposition. Empty while idle.
    pub ranges: BTreeSet<SubRange>,
    pub subscriptions: FxHashMap<SubRange, ActiveRange>,
    pub outstanding: FxHashSet<SubRange>,
    pub locations: FxHashMap<String, LocationInfo>,
    next_token: u64,
}

impl QueryState {
    pub fn new(center: Location, radius: f64) -> Self {
        Self {
            center,
            radius,
            listeners: Vec::new(),
            ranges: BTreeSet::new(),
            subscriptions: FxHashMap::default(),
            outstanding: FxHashSet::default(),
            locations: FxHashMap::default(),
            next_token: 0,
        }
    }

    pub fn phase(&self) -> QueryPhase {
        if self.listeners.is_empty() {
            QueryPhase::Idle
        } else if self.outstanding.is_empty() {
            QueryPhase::Ready
        } else {
            QueryPhase::Loading
        }
    }

    pub fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Whether a notification tagged with `token` for `range` is still current.
    pub fn is_current(&self, range: &SubRange, token: u64) -> bool {
        self.subscriptions
            .get(range)
            .is_some_and(|active| active.token == token)
    }

    pub fn is_inside(&self, location: &Location) -> bool {
        distance(location, &self.center) <= self.radius
    }

    pub fn is_covered(&self, geohash: &GeoHash) -> bool {
        self.ranges.iter().any(|range| range.contains_geohash(geohash))
    }

    /// Record a new location for `key` and classify the change.
    pub fn update_location(
        &mut self,
        key: &str,
        location: Location,
        record: &LocationRecord,
    ) -> EventBatch {
        let mut events = EventBatch::new();
        let old = self.locations.get(key);
        let is_new = old.is_none();
        let was_inside = old.is_some_and(|info| info.inside);
        let moved = old.is_some_and(|info| info.location != location);
        let inside = self.is_inside(&location);

        if (is_new || !was_inside) && inside {
            events.push(QueryEvent::Entered {
                key: key.to_string(),
                location,
                record: record.clone(),
            });
        } else if !is_new && inside {
            if moved {
                events.push(QueryEvent::Moved {
                    key: key.to_string(),
                    location,
                    record: record.clone(),
                });
            }
            events.push(QueryEvent::Changed {
                key: key.to_string(),
                location,
                record: record.clone(),
            });
        } else if was_inside && !inside {
            events.push(QueryEvent::Exited {
                key: key.to_string(),
                record: record.clone(),
            });
        }

        for event in &events {
            log::trace!("Classified {}", event);
        }

        self.locations.insert(
            key.to_string(),
            LocationInfo {
                location,
                inside,
                geohash: GeoHash::new(&location),
                record: record.clone(),
            },
        );
        events
    }

    /// Stop tracking `key`, returning `exited` if it was inside.
    pub fn forget(&mut self, key: &str) -> Option<QueryEvent> {
        let info = self.locations.remove(key)?;
        info.inside.then(|| QueryEvent::Exited {
            key: key.to_string(),
            record: info.record,
        })
    }

    /// Re-run classification for every tracked key against the current
    /// center and radius, in key order.
    pub fn reclassify_all(&mut self) -> Vec<QueryEvent> {
        let mut tracked: Vec<(String, Location, LocationRecord)> = self
            .locations
            .iter()
            .map(|(key, info)| (key.clone(), info.location, info.record.clone()))
            .collect();
        tracked.sort_by(|a, b| a.0.cmp(&b.0));

        tracked
            .into_iter()
            .flat_map(|(key, location, record)| self.update_location(&key, location, &record))
            .collect()
    }

    /// Drop tracked keys that no current sub-range covers.
    pub fn retain_covered(&mut self) {
        let ranges = &self.ranges;
        self.locations.retain(|key, info| {
            let covered = ranges.iter().any(|range| range.contains_geohash(&info.geohash));
            if !covered {
                log::trace!("Dropping {} (no longer under any sub-range)", key);
            }
            covered
        });
    }

    /// `entered` for every inside key, in key order.
    pub fn entered_snapshot(&self) -> Vec<QueryEvent> {
        let mut inside: Vec<_> = self
            .locations
            .iter()
            .filter(|(_, info)| info.inside)
            .map(|(key, info)| QueryEvent::Entered {
                key: key.clone(),
                location: info.location,
                record: info.record.clone(),
            })
            .collect();
        inside.sort_by(|a, b| a.key().cmp(&b.key()));
        inside
    }

    /// Clear all generation state, returning the subscriptions to cancel.
    /// Center and radius are kept.
    pub fn reset(&mut self) -> Vec<SubscriptionId> {
        self.ranges.clear();
        self.outstanding.clear();
        self.locations.clear();
        self.subscriptions
            .drain()
            .map(|(_, active)| active.id)
            .collect()
    }
}

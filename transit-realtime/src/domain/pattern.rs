//! Stop patterns and trip patterns.
//!
//! A pattern is the ordered list of stops a group of trips serves, together
//! with the boarding and alighting rule at each stop. Two patterns are the
//! same when their stop ids and rules match, regardless of object identity;
//! [`PatternKey`] is the normalized form used to index them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FeedScopedId, Route, Stop, Timetable};

/// Boarding or alighting rule at one stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PickDrop {
    #[default]
    Scheduled = 0,
    None = 1,
    CallAgency = 2,
    CoordinateWithDriver = 3,
    Cancelled = 4,
}

impl PickDrop {
    /// Returns true if passengers can use the stop under this rule.
    pub fn is_routable(self) -> bool {
        !matches!(self, PickDrop::None | PickDrop::Cancelled)
    }

    fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One stop of a pattern together with its boarding rules.
#[derive(Debug, Clone)]
pub struct PatternStop {
    pub stop: Arc<Stop>,
    pub pickup: PickDrop,
    pub dropoff: PickDrop,
}

impl PatternStop {
    pub fn new(stop: Arc<Stop>) -> Self {
        Self {
            stop,
            pickup: PickDrop::Scheduled,
            dropoff: PickDrop::Scheduled,
        }
    }

    /// Returns true if passengers can board or alight here.
    pub fn is_routable(&self) -> bool {
        self.pickup.is_routable() || self.dropoff.is_routable()
    }
}

/// Normalized structural key of a stop pattern: ordered stop ids plus one
/// pickup and one dropoff byte per stop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternKey {
    stop_ids: Vec<FeedScopedId>,
    rules: Vec<u8>,
}

/// The ordered stops of a pattern.
#[derive(Debug, Clone)]
pub struct StopPattern {
    stops: Vec<PatternStop>,
}

impl StopPattern {
    pub fn new(stops: Vec<PatternStop>) -> Self {
        Self { stops }
    }

    /// Pattern where every stop uses the scheduled pickup and dropoff rule.
    pub fn scheduled(stops: impl IntoIterator<Item = Arc<Stop>>) -> Self {
        Self::new(stops.into_iter().map(PatternStop::new).collect())
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stops(&self) -> &[PatternStop] {
        &self.stops
    }

    pub fn stop(&self, index: usize) -> Option<&Arc<Stop>> {
        self.stops.get(index).map(|s| &s.stop)
    }

    /// Index of the first occurrence of a stop id.
    pub fn find_stop(&self, stop_id: &FeedScopedId) -> Option<usize> {
        self.stops.iter().position(|s| &s.stop.id == stop_id)
    }

    /// Returns true if any stop of this pattern belongs to the given station.
    pub fn serves_station(&self, station_id: &FeedScopedId) -> bool {
        self.stops.iter().any(|s| s.stop.station_id() == station_id)
    }

    pub fn key(&self) -> PatternKey {
        let stop_ids = self.stops.iter().map(|s| s.stop.id.clone()).collect();
        let rules = self
            .stops
            .iter()
            .flat_map(|s| [s.pickup.as_byte(), s.dropoff.as_byte()])
            .collect();
        PatternKey { stop_ids, rules }
    }
}

impl PartialEq for StopPattern {
    fn eq(&self, other: &Self) -> bool {
        self.stops.len() == other.stops.len()
            && self.stops.iter().zip(&other.stops).all(|(a, b)| {
                a.stop.id == b.stop.id && a.pickup == b.pickup && a.dropoff == b.dropoff
            })
    }
}

impl Eq for StopPattern {}

/// A stop pattern bound to a route, with its scheduled timetable.
#[derive(Debug)]
pub struct TripPattern {
    id: FeedScopedId,
    route: Arc<Route>,
    stop_pattern: StopPattern,
    /// Set for patterns that only exist because of real-time data.
    created_by_realtime: bool,
    /// The planned pattern a real-time pattern was derived from.
    original_pattern: Option<FeedScopedId>,
    scheduled_timetable: Arc<Timetable>,
}

impl TripPattern {
    /// Create a planned pattern from the static schedule.
    pub fn new(
        id: FeedScopedId,
        route: Arc<Route>,
        stop_pattern: StopPattern,
        scheduled_timetable: Timetable,
    ) -> Self {
        Self {
            id,
            route,
            stop_pattern,
            created_by_realtime: false,
            original_pattern: None,
            scheduled_timetable: Arc::new(scheduled_timetable),
        }
    }

    /// Create a pattern on behalf of real-time data. Its scheduled timetable
    /// is empty: trips placed on it carry their own planned times.
    pub fn new_realtime(
        id: FeedScopedId,
        route: Arc<Route>,
        stop_pattern: StopPattern,
        original_pattern: Option<FeedScopedId>,
    ) -> Self {
        let scheduled_timetable = Arc::new(Timetable::new(id.clone(), None));
        Self {
            id,
            route,
            stop_pattern,
            created_by_realtime: true,
            original_pattern,
            scheduled_timetable,
        }
    }

    pub fn id(&self) -> &FeedScopedId {
        &self.id
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn stop_pattern(&self) -> &StopPattern {
        &self.stop_pattern
    }

    pub fn num_stops(&self) -> usize {
        self.stop_pattern.len()
    }

    pub fn created_by_realtime(&self) -> bool {
        self.created_by_realtime
    }

    pub fn original_pattern(&self) -> Option<&FeedScopedId> {
        self.original_pattern.as_ref()
    }

    pub fn scheduled_timetable(&self) -> &Arc<Timetable> {
        &self.scheduled_timetable
    }

    pub fn key(&self) -> PatternKey {
        self.stop_pattern.key()
    }
}

impl fmt::Display for TripPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.id)?;
        for (i, s) in self.stop_pattern.stops().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(s.stop.id.id())?;
        }
        f.write_str("]")
    }
}

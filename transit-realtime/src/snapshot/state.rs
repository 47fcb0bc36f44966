//! Real-time data shared by the buffer and published snapshots.
//!
//! Every map sits behind its own `Arc`. Freezing the buffer into a snapshot
//! clones only those pointers; the buffer copies a map on its next write to
//! it (`Arc::make_mut`), so a published snapshot is never touched again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{
    CancelationKind, FeedScopedId, RealTimeState, Route, Timetable, Trip, TripIdAndServiceDate,
    TripOnServiceDate, TripPattern, TripTimes,
};

/// Real-time timetables of one pattern, keyed by service date.
#[derive(Debug, Clone)]
pub struct PatternTimetables {
    pattern: Arc<TripPattern>,
    by_date: BTreeMap<NaiveDate, Arc<Timetable>>,
}

impl PatternTimetables {
    pub(crate) fn new(pattern: Arc<TripPattern>) -> Self {
        Self {
            pattern,
            by_date: BTreeMap::new(),
        }
    }

    pub fn pattern(&self) -> &Arc<TripPattern> {
        &self.pattern
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Arc<Timetable>> {
        self.by_date.get(&date)
    }

    /// Timetables ordered by service date.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &Arc<Timetable>)> {
        self.by_date.iter().map(|(d, t)| (*d, t))
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub(crate) fn insert(&mut self, date: NaiveDate, timetable: Arc<Timetable>) {
        self.by_date.insert(date, timetable);
    }

    pub(crate) fn remove(&mut self, date: NaiveDate) -> Option<Arc<Timetable>> {
        self.by_date.remove(&date)
    }

    pub(crate) fn retain_dates(&mut self, mut keep: impl FnMut(NaiveDate) -> bool) {
        self.by_date.retain(|d, _| keep(*d));
    }
}

/// Mapping from pattern id to its real-time timetables.
pub type TimetableIndex = HashMap<FeedScopedId, PatternTimetables>;

/// The indexed real-time state.
#[derive(Debug, Clone, Default)]
pub struct RealTimeData {
    pub(crate) timetables: Arc<TimetableIndex>,
    /// Patterns created for trips whose stop pattern changed.
    pub(crate) new_patterns_for_modified_trips: Arc<HashMap<TripIdAndServiceDate, Arc<TripPattern>>>,
    /// The planned pattern holding a trip's real-time row, for reverting.
    pub(crate) scheduled_patterns_for_trips: Arc<HashMap<TripIdAndServiceDate, Arc<TripPattern>>>,
    pub(crate) added_routes: Arc<HashMap<FeedScopedId, Arc<Route>>>,
    pub(crate) added_trips: Arc<HashMap<FeedScopedId, Arc<Trip>>>,
    pub(crate) added_pattern_for_trip: Arc<HashMap<FeedScopedId, Arc<TripPattern>>>,
    pub(crate) added_patterns_for_route:
        Arc<HashMap<FeedScopedId, BTreeMap<FeedScopedId, Arc<TripPattern>>>>,
    pub(crate) added_trips_on_service_date_by_id: Arc<HashMap<FeedScopedId, Arc<TripOnServiceDate>>>,
    pub(crate) added_trips_on_service_date: Arc<HashMap<TripIdAndServiceDate, Arc<TripOnServiceDate>>>,
    pub(crate) patterns_for_stop: Arc<HashMap<FeedScopedId, BTreeMap<FeedScopedId, Arc<TripPattern>>>>,
}

/// A trip cancelled on one service date.
#[derive(Debug, Clone)]
pub struct CanceledTrip {
    pub service_date: NaiveDate,
    pub pattern: Arc<TripPattern>,
    pub trip_times: Arc<TripTimes>,
}

/// Read access to real-time data.
///
/// Implemented by both the mutable buffer and published snapshots, so the
/// update pipeline sees its own staged changes through the same queries
/// routing uses on a snapshot.
pub trait TimetableRepository {
    fn data(&self) -> &RealTimeData;

    /// The timetable valid for a pattern on a date: the real-time copy if
    /// one exists, else the planned timetable.
    fn resolve(&self, pattern: &TripPattern, service_date: NaiveDate) -> Arc<Timetable> {
        self.realtime_timetable(pattern.id(), service_date)
            .cloned()
            .unwrap_or_else(|| Arc::clone(pattern.scheduled_timetable()))
    }

    /// The real-time timetable for a pattern and date, if any.
    fn realtime_timetable(
        &self,
        pattern_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> Option<&Arc<Timetable>> {
        self.data().timetables.get(pattern_id)?.get(service_date)
    }

    fn timetables(&self) -> &TimetableIndex {
        &self.data().timetables
    }

    /// Number of (pattern, date) timetables with real-time data.
    fn timetable_count(&self) -> usize {
        self.data().timetables.values().map(PatternTimetables::len).sum()
    }

    fn new_pattern_for_modified_trip(
        &self,
        trip_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> Option<&Arc<TripPattern>> {
        let key = TripIdAndServiceDate::new(trip_id.clone(), service_date);
        self.data().new_patterns_for_modified_trips.get(&key)
    }

    fn added_trip(&self, id: &FeedScopedId) -> Option<&Arc<Trip>> {
        self.data().added_trips.get(id)
    }

    /// Added trips ordered by id.
    fn added_trips(&self) -> Vec<&Arc<Trip>> {
        let mut trips: Vec<_> = self.data().added_trips.values().collect();
        trips.sort_by(|a, b| a.id.cmp(&b.id));
        trips
    }

    fn added_route(&self, id: &FeedScopedId) -> Option<&Arc<Route>> {
        self.data().added_routes.get(id)
    }

    /// Added routes ordered by id.
    fn added_routes(&self) -> Vec<&Arc<Route>> {
        let mut routes: Vec<_> = self.data().added_routes.values().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    fn added_pattern_for_trip(&self, trip_id: &FeedScopedId) -> Option<&Arc<TripPattern>> {
        self.data().added_pattern_for_trip.get(trip_id)
    }

    /// Patterns of added trips on a route, ordered by pattern id.
    fn added_patterns_for_route(&self, route_id: &FeedScopedId) -> Vec<&Arc<TripPattern>> {
        self.data()
            .added_patterns_for_route
            .get(route_id)
            .map(|patterns| patterns.values().collect())
            .unwrap_or_default()
    }

    fn added_trip_on_service_date_by_id(
        &self,
        id: &FeedScopedId,
    ) -> Option<&Arc<TripOnServiceDate>> {
        self.data().added_trips_on_service_date_by_id.get(id)
    }

    fn added_trip_on_service_date(
        &self,
        trip_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> Option<&Arc<TripOnServiceDate>> {
        let key = TripIdAndServiceDate::new(trip_id.clone(), service_date);
        self.data().added_trips_on_service_date.get(&key)
    }

    /// Real-time patterns serving a stop, ordered by pattern id.
    fn patterns_for_stop(&self, stop_id: &FeedScopedId) -> Vec<&Arc<TripPattern>> {
        self.data()
            .patterns_for_stop
            .get(stop_id)
            .map(|patterns| patterns.values().collect())
            .unwrap_or_default()
    }

    /// Trips cancelled (not deleted) in real time, by date then trip id.
    fn list_canceled_trips(&self) -> Vec<CanceledTrip> {
        let mut canceled: Vec<_> = self
            .data()
            .timetables
            .values()
            .flat_map(|pt| {
                pt.iter().flat_map(move |(date, timetable)| {
                    timetable
                        .trip_times()
                        .iter()
                        .filter(|t| {
                            *t.state() == RealTimeState::Canceled(CancelationKind::Canceled)
                        })
                        .map(move |t| CanceledTrip {
                            service_date: date,
                            pattern: Arc::clone(pt.pattern()),
                            trip_times: Arc::clone(t),
                        })
                })
            })
            .collect();
        canceled.sort_by(|a, b| {
            a.service_date
                .cmp(&b.service_date)
                .then_with(|| a.trip_times.trip_id().cmp(b.trip_times.trip_id()))
        });
        canceled
    }

    /// Returns true if there is no real-time data at all.
    fn is_empty(&self) -> bool {
        let data = self.data();
        data.timetables.is_empty()
            && data.new_patterns_for_modified_trips.is_empty()
            && data.added_trips.is_empty()
            && data.added_routes.is_empty()
            && data.added_trips_on_service_date_by_id.is_empty()
    }
}

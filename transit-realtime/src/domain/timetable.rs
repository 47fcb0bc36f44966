//! Timetables: the trip rows of one pattern on one service date.

use std::sync::Arc;

use chrono::NaiveDate;

use super::{FeedScopedId, TripTimes};

/// Trip rows for one pattern, ordered by first departure then trip id.
///
/// The scheduled timetable of a pattern has no service date. Real-time
/// copies are made per service date and never modified in place: every
/// change produces a new `Timetable` sharing the untouched rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetable {
    pattern_id: FeedScopedId,
    service_date: Option<NaiveDate>,
    trip_times: Vec<Arc<TripTimes>>,
}

impl Timetable {
    pub fn new(pattern_id: FeedScopedId, service_date: Option<NaiveDate>) -> Self {
        Self {
            pattern_id,
            service_date,
            trip_times: Vec::new(),
        }
    }

    /// Build a timetable from unordered rows.
    pub fn from_trip_times(
        pattern_id: FeedScopedId,
        service_date: Option<NaiveDate>,
        trip_times: impl IntoIterator<Item = TripTimes>,
    ) -> Self {
        let mut trip_times: Vec<_> = trip_times.into_iter().map(Arc::new).collect();
        trip_times.sort_by(|a, b| row_order(a, b));
        Self {
            pattern_id,
            service_date,
            trip_times,
        }
    }

    pub fn pattern_id(&self) -> &FeedScopedId {
        &self.pattern_id
    }

    pub fn service_date(&self) -> Option<NaiveDate> {
        self.service_date
    }

    pub fn trip_times(&self) -> &[Arc<TripTimes>] {
        &self.trip_times
    }

    pub fn len(&self) -> usize {
        self.trip_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trip_times.is_empty()
    }

    pub fn trip_index(&self, trip_id: &FeedScopedId) -> Option<usize> {
        self.trip_times.iter().position(|t| t.trip_id() == trip_id)
    }

    pub fn trip_times_for(&self, trip_id: &FeedScopedId) -> Option<&Arc<TripTimes>> {
        self.trip_times.iter().find(|t| t.trip_id() == trip_id)
    }

    /// Returns true if any row deviates from the plan.
    pub fn has_realtime_data(&self) -> bool {
        self.trip_times.iter().any(|t| t.has_realtime_data())
    }

    /// Copy of this timetable bound to a service date.
    pub fn copy_for_service_date(&self, service_date: NaiveDate) -> Timetable {
        Self {
            pattern_id: self.pattern_id.clone(),
            service_date: Some(service_date),
            trip_times: self.trip_times.clone(),
        }
    }

    /// Copy with the row for `trip_times`' trip replaced, or added if the
    /// trip has no row yet.
    pub fn with_trip_times(&self, trip_times: TripTimes) -> Timetable {
        let mut rows: Vec<_> = self
            .trip_times
            .iter()
            .filter(|t| t.trip_id() != trip_times.trip_id())
            .cloned()
            .collect();
        rows.push(Arc::new(trip_times));
        rows.sort_by(|a, b| row_order(a, b));
        Self {
            pattern_id: self.pattern_id.clone(),
            service_date: self.service_date,
            trip_times: rows,
        }
    }

    /// Copy without the given trip's row.
    pub fn without_trip(&self, trip_id: &FeedScopedId) -> Timetable {
        Self {
            pattern_id: self.pattern_id.clone(),
            service_date: self.service_date,
            trip_times: self
                .trip_times
                .iter()
                .filter(|t| t.trip_id() != trip_id)
                .cloned()
                .collect(),
        }
    }
}

fn row_order(a: &TripTimes, b: &TripTimes) -> std::cmp::Ordering {
    a.first_departure()
        .cmp(&b.first_departure())
        .then_with(|| a.trip_id().cmp(b.trip_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Agency, CancelationKind, Route, ScheduledStopTime, ServiceTime, TransitMode, Trip,
    };

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn trip_times(id: &str, first_departure: i32) -> TripTimes {
        let route = Arc::new(Route {
            id: FeedScopedId::new("F", "R1"),
            agency: Arc::new(Agency {
                id: FeedScopedId::new("F", "A"),
                name: "A".into(),
            }),
            operator: None,
            short_name: None,
            mode: TransitMode::Bus,
            sub_mode: None,
            created_by_realtime: false,
        });
        let trip = Arc::new(Trip::new(
            FeedScopedId::new("F", id),
            route,
            FeedScopedId::new("F", "CAL"),
        ));
        let stop = |s: i32| ScheduledStopTime {
            arrival: ServiceTime::from_seconds(s),
            departure: ServiceTime::from_seconds(s),
            stop_sequence: 0,
        };
        TripTimes::new_scheduled(trip, vec![stop(first_departure), stop(first_departure + 60)])
            .unwrap()
    }

    fn pattern_id() -> FeedScopedId {
        FeedScopedId::new("F", "P1")
    }

    #[test]
    fn rows_sorted_by_first_departure() {
        let tt = Timetable::from_trip_times(
            pattern_id(),
            None,
            [trip_times("T2", 600), trip_times("T1", 900), trip_times("T0", 600)],
        );
        let ids: Vec<_> = tt.trip_times().iter().map(|t| t.trip_id().id()).collect();
        assert_eq!(ids, ["T0", "T2", "T1"]);
    }

    #[test]
    fn with_trip_times_replaces_existing_row() {
        let tt = Timetable::from_trip_times(pattern_id(), None, [trip_times("T1", 600)]);
        let canceled = trip_times("T1", 600).cancel(CancelationKind::Canceled);
        let updated = tt.with_trip_times(canceled.clone());
        assert_eq!(updated.len(), 1);
        assert_eq!(**updated.trip_times_for(&FeedScopedId::new("F", "T1")).unwrap(), canceled);

        // Same change twice gives an equal timetable
        assert_eq!(updated.with_trip_times(canceled), updated);
        // Original untouched
        assert!(!tt.has_realtime_data());
        assert!(updated.has_realtime_data());
    }

    #[test]
    fn with_trip_times_adds_missing_row() {
        let tt = Timetable::new(pattern_id(), Some(date()));
        let updated = tt.with_trip_times(trip_times("T9", 60));
        assert_eq!(updated.len(), 1);
        assert!(tt.is_empty());
        assert_eq!(updated.service_date(), Some(date()));
    }

    #[test]
    fn without_trip() {
        let tt = Timetable::from_trip_times(
            pattern_id(),
            None,
            [trip_times("T1", 600), trip_times("T2", 700)],
        );
        let removed = tt.without_trip(&FeedScopedId::new("F", "T1"));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed.trip_index(&FeedScopedId::new("F", "T2")), Some(0));
        assert_eq!(removed.trip_index(&FeedScopedId::new("F", "T1")), None);
    }

    #[test]
    fn copy_for_service_date_shares_rows() {
        let tt = Timetable::from_trip_times(pattern_id(), None, [trip_times("T1", 600)]);
        let copy = tt.copy_for_service_date(date());
        assert_eq!(copy.service_date(), Some(date()));
        assert!(Arc::ptr_eq(&tt.trip_times()[0], &copy.trip_times()[0]));
    }
}

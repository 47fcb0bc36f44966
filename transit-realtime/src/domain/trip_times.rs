//! Per-trip stop times and the real-time state machine.
//!
//! A [`TripTimes`] always carries the planned times of its trip. Real-time
//! information lives in a [`RealTimeState`], a closed set of states where
//! each variant holds only what that state needs:
//!
//! ```text
//! Scheduled ──► Updated   (same stops, new times)
//!           ──► Modified  (stop pattern changed, new times)
//!           ──► Canceled  (no times; every stop unusable)
//! (new trip) ─► Added     (exists only in real time)
//! ```
//!
//! `TripTimes` values are immutable. Changes go through
//! [`RealTimeTripTimesBuilder`], whose `build` validates the proposed times
//! before any value escapes.

use std::fmt;
use std::sync::Arc;

use super::{FeedScopedId, ServiceTime, StopPattern, Trip};
use crate::validate::{ValidationError, validate_times};

/// Planned arrival and departure at one stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledStopTime {
    pub arrival: ServiceTime,
    pub departure: ServiceTime,
    /// The feed's own numbering of the stop within the trip.
    pub stop_sequence: u32,
}

/// Flags describing the quality of a real-time stop time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopRealTimeFlags {
    /// The vehicle has already passed and the times are observed.
    pub recorded: bool,
    pub cancelled: bool,
    /// The producer has no information; times are planned ones.
    pub no_data: bool,
    pub inaccurate_prediction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealTimeStopTime {
    pub arrival: ServiceTime,
    pub departure: ServiceTime,
    pub flags: StopRealTimeFlags,
}

/// Real-time times for every stop of a trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealTimeTimes(Arc<[RealTimeStopTime]>);

impl RealTimeTimes {
    pub fn stops(&self) -> &[RealTimeStopTime] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelationKind {
    /// Cancelled by the producer; still shown to travellers.
    Canceled,
    /// Removed, typically because the trip was moved to another pattern.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealTimeState {
    Scheduled,
    Updated(RealTimeTimes),
    Canceled(CancelationKind),
    Modified(RealTimeTimes),
    Added(RealTimeTimes),
}

impl RealTimeState {
    pub fn kind(&self) -> RealTimeStateKind {
        match self {
            RealTimeState::Scheduled => RealTimeStateKind::Scheduled,
            RealTimeState::Updated(_) => RealTimeStateKind::Updated,
            RealTimeState::Canceled(_) => RealTimeStateKind::Canceled,
            RealTimeState::Modified(_) => RealTimeStateKind::Modified,
            RealTimeState::Added(_) => RealTimeStateKind::Added,
        }
    }

    fn times(&self) -> Option<&RealTimeTimes> {
        match self {
            RealTimeState::Updated(t) | RealTimeState::Modified(t) | RealTimeState::Added(t) => {
                Some(t)
            }
            RealTimeState::Scheduled | RealTimeState::Canceled(_) => None,
        }
    }
}

/// Discriminant of [`RealTimeState`] for comparisons and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealTimeStateKind {
    Scheduled,
    Updated,
    Canceled,
    Modified,
    Added,
}

impl fmt::Display for RealTimeStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RealTimeStateKind::Scheduled => "SCHEDULED",
            RealTimeStateKind::Updated => "UPDATED",
            RealTimeStateKind::Canceled => "CANCELED",
            RealTimeStateKind::Modified => "MODIFIED",
            RealTimeStateKind::Added => "ADDED",
        };
        f.write_str(s)
    }
}

/// The state a builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealTimeChange {
    Updated,
    Modified,
    Added,
}

/// Stop times of one trip.
///
/// Indexing methods panic if `stop` is not below [`TripTimes::num_stops`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripTimes {
    trip: Arc<Trip>,
    scheduled: Arc<[ScheduledStopTime]>,
    state: RealTimeState,
}

impl TripTimes {
    /// Planned times for a trip, as produced by schedule loading.
    pub fn new_scheduled(
        trip: Arc<Trip>,
        stop_times: Vec<ScheduledStopTime>,
    ) -> Result<Self, ValidationError> {
        validate_times(stop_times.iter().map(|s| (s.arrival, s.departure)))?;
        Ok(Self {
            trip,
            scheduled: stop_times.into(),
            state: RealTimeState::Scheduled,
        })
    }

    pub fn trip(&self) -> &Arc<Trip> {
        &self.trip
    }

    pub fn trip_id(&self) -> &FeedScopedId {
        &self.trip.id
    }

    pub fn num_stops(&self) -> usize {
        self.scheduled.len()
    }

    pub fn state(&self) -> &RealTimeState {
        &self.state
    }

    pub fn state_kind(&self) -> RealTimeStateKind {
        self.state.kind()
    }

    pub fn arrival(&self, stop: usize) -> ServiceTime {
        match self.state.times() {
            Some(t) => t.stops()[stop].arrival,
            None => self.scheduled[stop].arrival,
        }
    }

    pub fn departure(&self, stop: usize) -> ServiceTime {
        match self.state.times() {
            Some(t) => t.stops()[stop].departure,
            None => self.scheduled[stop].departure,
        }
    }

    pub fn scheduled_arrival(&self, stop: usize) -> ServiceTime {
        self.scheduled[stop].arrival
    }

    pub fn scheduled_departure(&self, stop: usize) -> ServiceTime {
        self.scheduled[stop].departure
    }

    pub fn scheduled_stop_times(&self) -> &[ScheduledStopTime] {
        &self.scheduled
    }

    pub fn stop_sequence(&self, stop: usize) -> u32 {
        self.scheduled[stop].stop_sequence
    }

    pub fn flags(&self, stop: usize) -> StopRealTimeFlags {
        match &self.state {
            RealTimeState::Canceled(_) => StopRealTimeFlags {
                cancelled: true,
                ..StopRealTimeFlags::default()
            },
            state => state
                .times()
                .map(|t| t.stops()[stop].flags)
                .unwrap_or_default(),
        }
    }

    /// Departure from the first stop, used to order timetable rows.
    pub fn first_departure(&self) -> ServiceTime {
        if self.num_stops() == 0 {
            ServiceTime::MIDNIGHT
        } else {
            self.departure(0)
        }
    }

    pub fn is_canceled_or_deleted(&self) -> bool {
        matches!(self.state, RealTimeState::Canceled(_))
    }

    pub fn is_deleted(&self) -> bool {
        self.state == RealTimeState::Canceled(CancelationKind::Deleted)
    }

    /// Returns true if the times differ from the plan in any way.
    pub fn has_realtime_data(&self) -> bool {
        self.state != RealTimeState::Scheduled
    }

    /// Copy of this trip cancelled as a whole.
    pub fn cancel(&self, kind: CancelationKind) -> TripTimes {
        Self {
            trip: Arc::clone(&self.trip),
            scheduled: Arc::clone(&self.scheduled),
            state: RealTimeState::Canceled(kind),
        }
    }

    /// Copy of this trip with all real-time information dropped.
    pub fn to_scheduled(&self) -> TripTimes {
        Self {
            trip: Arc::clone(&self.trip),
            scheduled: Arc::clone(&self.scheduled),
            state: RealTimeState::Scheduled,
        }
    }

    /// Start a real-time edit from the planned times.
    pub fn builder(&self) -> RealTimeTripTimesBuilder {
        RealTimeTripTimesBuilder::from_scheduled(Arc::clone(&self.trip), Arc::clone(&self.scheduled))
    }

    /// One-line rendering against the pattern the trip runs on:
    /// `STATE | STOP [flags] arrival departure | ...`.
    ///
    /// Flags are `R` recorded, `C` cancelled, `ND` no data and `PI`
    /// prediction inaccurate.
    pub fn describe(&self, stops: &StopPattern) -> String {
        let mut out = self.state_kind().to_string();
        for i in 0..self.num_stops() {
            let name = stops.stop(i).map(|s| s.id.id()).unwrap_or("?");
            out.push_str(" | ");
            out.push_str(name);
            let flags = self.flags(i);
            for (set, label) in [
                (flags.recorded, "R"),
                (flags.cancelled, "C"),
                (flags.no_data, "ND"),
                (flags.inaccurate_prediction, "PI"),
            ] {
                if set {
                    out.push_str(" [");
                    out.push_str(label);
                    out.push(']');
                }
            }
            out.push_str(&format!(" {} {}", self.arrival(i), self.departure(i)));
        }
        out
    }
}

/// Mutable staging area for a trip's real-time times.
///
/// Starts from the planned times with no flags set.
#[derive(Debug, Clone)]
pub struct RealTimeTripTimesBuilder {
    trip: Arc<Trip>,
    scheduled: Arc<[ScheduledStopTime]>,
    stops: Vec<RealTimeStopTime>,
}

impl RealTimeTripTimesBuilder {
    /// Builder for a trip that has no planned times yet, such as an extra
    /// journey. The given times become its planned times.
    pub fn new(trip: Arc<Trip>, scheduled: Vec<ScheduledStopTime>) -> Self {
        Self::from_scheduled(trip, scheduled.into())
    }

    fn from_scheduled(trip: Arc<Trip>, scheduled: Arc<[ScheduledStopTime]>) -> Self {
        let stops = scheduled
            .iter()
            .map(|s| RealTimeStopTime {
                arrival: s.arrival,
                departure: s.departure,
                flags: StopRealTimeFlags::default(),
            })
            .collect();
        Self {
            trip,
            scheduled,
            stops,
        }
    }

    pub fn trip(&self) -> &Arc<Trip> {
        &self.trip
    }

    pub fn num_stops(&self) -> usize {
        self.stops.len()
    }

    pub fn arrival(&self, stop: usize) -> ServiceTime {
        self.stops[stop].arrival
    }

    pub fn departure(&self, stop: usize) -> ServiceTime {
        self.stops[stop].departure
    }

    pub fn scheduled_arrival(&self, stop: usize) -> ServiceTime {
        self.scheduled[stop].arrival
    }

    pub fn scheduled_departure(&self, stop: usize) -> ServiceTime {
        self.scheduled[stop].departure
    }

    pub fn stop_sequence(&self, stop: usize) -> u32 {
        self.scheduled[stop].stop_sequence
    }

    pub fn set_arrival(&mut self, stop: usize, time: ServiceTime) {
        self.stops[stop].arrival = time;
    }

    pub fn set_departure(&mut self, stop: usize, time: ServiceTime) {
        self.stops[stop].departure = time;
    }

    pub fn set_recorded(&mut self, stop: usize) {
        self.stops[stop].flags.recorded = true;
    }

    pub fn cancel_stop(&mut self, stop: usize) {
        self.stops[stop].flags.cancelled = true;
    }

    pub fn is_stop_cancelled(&self, stop: usize) -> bool {
        self.stops[stop].flags.cancelled
    }

    pub fn set_no_data(&mut self, stop: usize) {
        self.stops[stop].flags.no_data = true;
    }

    pub fn set_inaccurate_prediction(&mut self, stop: usize) {
        self.stops[stop].flags.inaccurate_prediction = true;
    }

    /// Spread the times of interior runs of cancelled stops between the
    /// surrounding served stops, in proportion to the planned running time.
    ///
    /// Returns true if any time changed.
    pub fn interpolate_cancelled_stops(&mut self) -> bool {
        let mut changed = false;
        let mut i = 0;
        while i < self.stops.len() {
            if !self.stops[i].flags.cancelled {
                i += 1;
                continue;
            }
            let start = i;
            while i < self.stops.len() && self.stops[i].flags.cancelled {
                i += 1;
            }
            // Leading or trailing runs have nothing to interpolate towards
            if start == 0 || i == self.stops.len() {
                continue;
            }
            let (before, after) = (start - 1, i);
            let from = self.stops[before].departure;
            let to = self.stops[after].arrival;
            let planned_from = self.scheduled[before].departure;
            let planned_span = self.scheduled[after].arrival - planned_from;
            for k in start..i {
                let scale = |planned: ServiceTime| {
                    if planned_span <= 0 {
                        return from;
                    }
                    let span = i64::from(to.seconds()) - i64::from(from.seconds());
                    let offset = i64::from(planned - planned_from) * span / i64::from(planned_span);
                    // Lies between `from` and `to` for stops inside the planned span
                    i32::try_from(i64::from(from.seconds()) + offset)
                        .map_or(from, ServiceTime::from_seconds)
                };
                let arrival = scale(self.scheduled[k].arrival);
                let departure = scale(self.scheduled[k].departure);
                if arrival != self.stops[k].arrival || departure != self.stops[k].departure {
                    self.stops[k].arrival = arrival;
                    self.stops[k].departure = departure;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Validate the times and freeze them in the given state.
    pub fn build(self, change: RealTimeChange) -> Result<TripTimes, ValidationError> {
        validate_times(self.stops.iter().map(|s| (s.arrival, s.departure)))?;
        let times = RealTimeTimes(self.stops.into());
        let state = match change {
            RealTimeChange::Updated => RealTimeState::Updated(times),
            RealTimeChange::Modified => RealTimeState::Modified(times),
            RealTimeChange::Added => RealTimeState::Added(times),
        };
        Ok(TripTimes {
            trip: self.trip,
            scheduled: self.scheduled,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Agency, Route, Stop, TransitMode};

    fn t(s: &str) -> ServiceTime {
        ServiceTime::parse(s).unwrap()
    }

    fn trip() -> Arc<Trip> {
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
        Arc::new(Trip::new(
            FeedScopedId::new("F", "T1"),
            route,
            FeedScopedId::new("F", "CAL"),
        ))
    }

    fn pattern(ids: &[&str]) -> StopPattern {
        StopPattern::scheduled(ids.iter().map(|id| {
            Arc::new(Stop {
                id: FeedScopedId::new("F", *id),
                name: id.to_string(),
                parent_station: None,
            })
        }))
    }

    fn scheduled(times: &[(&str, &str)]) -> TripTimes {
        let stop_times = times
            .iter()
            .enumerate()
            .map(|(i, (arr, dep))| ScheduledStopTime {
                arrival: t(arr),
                departure: t(dep),
                stop_sequence: i as u32,
            })
            .collect();
        TripTimes::new_scheduled(trip(), stop_times).unwrap()
    }

    #[test]
    fn scheduled_times_are_validated() {
        let stop_times = vec![
            ScheduledStopTime {
                arrival: t("0:10"),
                departure: t("0:11"),
                stop_sequence: 0,
            },
            ScheduledStopTime {
                arrival: t("0:05"),
                departure: t("0:06"),
                stop_sequence: 1,
            },
        ];
        assert_eq!(
            TripTimes::new_scheduled(trip(), stop_times),
            Err(ValidationError::NegativeHopTime { stop_index: 1 })
        );
    }

    #[test]
    fn describe_scheduled() {
        let tt = scheduled(&[("0:00:10", "0:00:11"), ("0:00:20", "0:00:21")]);
        assert_eq!(
            tt.describe(&pattern(&["A1", "B1"])),
            "SCHEDULED | A1 0:00:10 0:00:11 | B1 0:00:20 0:00:21"
        );
    }

    #[test]
    fn update_keeps_schedule() {
        let tt = scheduled(&[("0:00:10", "0:00:11"), ("0:00:20", "0:00:21")]);
        let mut builder = tt.builder();
        builder.set_arrival(0, t("0:00:15"));
        builder.set_departure(0, t("0:00:15"));
        builder.set_arrival(1, t("0:00:25"));
        builder.set_departure(1, t("0:00:25"));
        builder.set_recorded(0);
        let updated = builder.build(RealTimeChange::Updated).unwrap();

        assert_eq!(
            updated.describe(&pattern(&["A1", "B1"])),
            "UPDATED | A1 [R] 0:00:15 0:00:15 | B1 0:00:25 0:00:25"
        );
        assert_eq!(updated.scheduled_arrival(0), t("0:00:10"));
        assert_eq!(tt.state_kind(), RealTimeStateKind::Scheduled);
        assert!(updated.has_realtime_data());
    }

    #[test]
    fn build_rejects_invalid_times() {
        let tt = scheduled(&[("0:01", "0:01"), ("0:02", "0:02")]);
        let mut builder = tt.builder();
        builder.set_arrival(1, t("1:13"));
        builder.set_departure(1, t("1:12"));
        assert_eq!(
            builder.build(RealTimeChange::Updated),
            Err(ValidationError::NegativeDwellTime { stop_index: 1 })
        );
    }

    #[test]
    fn cancel_marks_every_stop() {
        let tt = scheduled(&[("0:01", "0:01"), ("0:02", "0:02")]);
        let canceled = tt.cancel(CancelationKind::Canceled);
        assert!(canceled.is_canceled_or_deleted());
        assert!(!canceled.is_deleted());
        assert_eq!(
            canceled.describe(&pattern(&["A1", "B1"])),
            "CANCELED | A1 [C] 0:01 0:01 | B1 [C] 0:02 0:02"
        );
        assert!(tt.cancel(CancelationKind::Deleted).is_deleted());
    }

    #[test]
    fn to_scheduled_drops_realtime() {
        let tt = scheduled(&[("0:01", "0:01"), ("0:02", "0:02")]);
        let mut builder = tt.builder();
        builder.set_departure(0, t("0:01:30"));
        builder.set_arrival(1, t("0:02:30"));
        builder.set_departure(1, t("0:02:30"));
        let updated = builder.build(RealTimeChange::Updated).unwrap();
        assert_eq!(updated.to_scheduled(), tt);
    }

    #[test]
    fn interpolates_interior_cancelled_stops() {
        let tt = scheduled(&[
            ("0:00", "0:00"),
            ("0:10", "0:10"),
            ("0:20", "0:20"),
        ]);
        let mut builder = tt.builder();
        builder.set_departure(0, t("0:10"));
        builder.set_arrival(0, t("0:10"));
        builder.cancel_stop(1);
        builder.set_arrival(2, t("0:30"));
        builder.set_departure(2, t("0:30"));
        assert!(builder.interpolate_cancelled_stops());
        assert_eq!(builder.arrival(1), t("0:20"));
        assert!(builder.clone().build(RealTimeChange::Updated).is_ok());
        assert!(!builder.interpolate_cancelled_stops());
    }

    #[test]
    fn leading_cancelled_stops_are_not_interpolated() {
        let tt = scheduled(&[("0:00", "0:00"), ("0:10", "0:10")]);
        let mut builder = tt.builder();
        builder.cancel_stop(0);
        assert!(!builder.interpolate_cancelled_stops());
    }

    #[test]
    fn added_trip_keeps_aimed_times_as_schedule() {
        let aimed = vec![
            ScheduledStopTime {
                arrival: t("0:01"),
                departure: t("0:01"),
                stop_sequence: 0,
            },
            ScheduledStopTime {
                arrival: t("0:03"),
                departure: t("0:03"),
                stop_sequence: 1,
            },
        ];
        let mut builder = RealTimeTripTimesBuilder::new(trip(), aimed);
        builder.set_arrival(0, t("0:02"));
        builder.set_departure(0, t("0:02"));
        builder.set_recorded(0);
        builder.set_arrival(1, t("0:04"));
        builder.set_departure(1, t("0:04"));
        let added = builder.build(RealTimeChange::Added).unwrap();
        let stops = pattern(&["C1", "D1"]);
        assert_eq!(added.describe(&stops), "ADDED | C1 [R] 0:02 0:02 | D1 0:04 0:04");
        assert_eq!(
            added.to_scheduled().describe(&stops),
            "SCHEDULED | C1 0:01 0:01 | D1 0:03 0:03"
        );
    }
}

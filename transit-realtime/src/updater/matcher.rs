//! Resolving message references to trips, stops and routes.
//!
//! [`EntityResolver`] handles explicit references: ids are looked up in the
//! planned schedule first and among trips added in real time second.
//! [`SiriFuzzyTripMatcher`] is the opt-in fallback for journeys whose ids
//! match nothing, based on where and when the journey ends.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use tracing::trace;

use super::siri::{Call, EstimatedVehicleJourney};
use crate::domain::{
    FeedScopedId, Route, ServiceTime, Stop, Trip, TripOnServiceDate, TripPattern,
};
use crate::schedule::TransitModel;
use crate::snapshot::TimetableRepository;

const SECONDS_PER_DAY: i32 = 24 * 3600;

/// Resolves the references of one feed's messages.
#[derive(Debug, Clone, Copy)]
pub struct EntityResolver<'a> {
    model: &'a TransitModel,
    feed_id: &'a str,
}

impl<'a> EntityResolver<'a> {
    pub fn new(model: &'a TransitModel, feed_id: &'a str) -> Self {
        Self { model, feed_id }
    }

    pub fn resolve_id(&self, id: &str) -> FeedScopedId {
        FeedScopedId::new(self.feed_id, id)
    }

    pub fn resolve_stop(&self, stop_ref: &str) -> Option<Arc<Stop>> {
        self.model.stop(&self.resolve_id(stop_ref)).cloned()
    }

    pub fn resolve_route(
        &self,
        line_ref: &str,
        realtime: &impl TimetableRepository,
    ) -> Option<Arc<Route>> {
        let id = self.resolve_id(line_ref);
        self.model
            .route(&id)
            .or_else(|| realtime.added_route(&id))
            .cloned()
    }

    /// A trip by trip id.
    pub fn resolve_trip_id(
        &self,
        trip_ref: &str,
        realtime: &impl TimetableRepository,
    ) -> Option<Arc<Trip>> {
        let id = self.resolve_id(trip_ref);
        self.model
            .trip(&id)
            .or_else(|| realtime.added_trip(&id))
            .cloned()
    }

    /// A dated trip by its own id.
    pub fn resolve_trip_on_service_date(
        &self,
        dated_ref: &str,
        realtime: &impl TimetableRepository,
    ) -> Option<Arc<TripOnServiceDate>> {
        let id = self.resolve_id(dated_ref);
        self.model
            .trip_on_service_date(&id)
            .or_else(|| realtime.added_trip_on_service_date_by_id(&id))
            .cloned()
    }

    /// The trip a journey refers to.
    ///
    /// Tried in order: the framed reference, the dated vehicle journey
    /// reference (as a dated trip, then as a trip id) and finally the
    /// journey code.
    pub fn resolve_trip(
        &self,
        journey: &EstimatedVehicleJourney,
        realtime: &impl TimetableRepository,
    ) -> Option<Arc<Trip>> {
        if let Some(framed) = &journey.framed_vehicle_journey_ref {
            if let Some(trip) = self.resolve_trip_id(&framed.dated_vehicle_journey_ref, realtime) {
                return Some(trip);
            }
        }
        if let Some(dated_ref) = &journey.dated_vehicle_journey_ref {
            if let Some(dated) = self.resolve_trip_on_service_date(dated_ref, realtime) {
                return Some(Arc::clone(&dated.trip));
            }
            if let Some(trip) = self.resolve_trip_id(dated_ref, realtime) {
                return Some(trip);
            }
        }
        journey
            .estimated_vehicle_journey_code
            .as_deref()
            .and_then(|code| self.resolve_trip_id(code, realtime))
    }

    /// The service date a journey runs on.
    ///
    /// Taken from the framed reference, else from the referenced dated trip,
    /// else from the local date of the first aimed time. In the last case
    /// `first_departure` (the trip's planned departure from its first stop,
    /// when known) moves the date back for trips starting after midnight of
    /// the service day.
    pub fn resolve_service_date(
        &self,
        journey: &EstimatedVehicleJourney,
        first_departure: Option<ServiceTime>,
        realtime: &impl TimetableRepository,
    ) -> Option<NaiveDate> {
        if let Some(framed) = &journey.framed_vehicle_journey_ref {
            return Some(framed.data_frame_ref);
        }
        if let Some(dated) = journey
            .dated_vehicle_journey_ref
            .as_deref()
            .and_then(|r| self.resolve_trip_on_service_date(r, realtime))
        {
            return Some(dated.service_date);
        }
        let (_, first) = journey.calls().next()?;
        let aimed = first.aimed_departure_time.or(first.aimed_arrival_time)?;
        let local = aimed.with_timezone(&self.model.time_zone()).date_naive();
        let days_offset = first_departure.map_or(0, |t| t.seconds().div_euclid(SECONDS_PER_DAY));
        local.checked_sub_signed(Duration::days(i64::from(days_offset)))
    }
}

/// A trip found by time and place rather than by id.
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub trip: Arc<Trip>,
    pub pattern: Arc<TripPattern>,
    pub service_date: NaiveDate,
}

/// Why the fuzzy matcher gave up, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoFuzzyMatch {
    MissingAimedTimes,
    UnknownStop,
    NoServiceDate,
    NoCandidate,
    ScoreTooLow,
}

type LastStopKey = (FeedScopedId, ServiceTime);

/// Matches journeys to planned trips by their last stop and arrival time.
///
/// Built once per schedule. Candidates sharing the last station and
/// planned arrival are filtered on the first stop and departure, then
/// scored by how many of the journey's stations the pattern serves.
#[derive(Debug)]
pub struct SiriFuzzyTripMatcher {
    by_last_stop: HashMap<LastStopKey, Vec<(Arc<Trip>, Arc<TripPattern>)>>,
    min_score: f64,
}

impl SiriFuzzyTripMatcher {
    pub fn new(model: &TransitModel, min_score: f64) -> Self {
        let mut by_last_stop: HashMap<LastStopKey, Vec<_>> = HashMap::new();
        for trip in model.trips() {
            let Some(pattern) = model.pattern_for_trip(&trip.id) else {
                continue;
            };
            let Some(last) = pattern.num_stops().checked_sub(1) else {
                continue;
            };
            let (Some(stop), Some(times)) = (
                pattern.stop_pattern().stop(last),
                pattern.scheduled_timetable().trip_times_for(&trip.id),
            ) else {
                continue;
            };
            by_last_stop
                .entry((stop.station_id().clone(), times.scheduled_arrival(last)))
                .or_default()
                .push((Arc::clone(trip), Arc::clone(pattern)));
        }
        Self {
            by_last_stop,
            min_score,
        }
    }

    pub fn match_journey(
        &self,
        journey: &EstimatedVehicleJourney,
        model: &TransitModel,
        resolver: &EntityResolver<'_>,
    ) -> Result<FuzzyMatch, NoFuzzyMatch> {
        let calls: Vec<&Call> = journey.calls().map(|(_, c)| c).collect();
        let (Some(first), Some(last)) = (calls.first(), calls.last()) else {
            return Err(NoFuzzyMatch::MissingAimedTimes);
        };
        let (Some(departure), Some(arrival)) =
            (first.aimed_departure_time, last.aimed_arrival_time)
        else {
            return Err(NoFuzzyMatch::MissingAimedTimes);
        };

        let first_stop = resolver
            .resolve_stop(&first.stop_point_ref)
            .ok_or(NoFuzzyMatch::UnknownStop)?;
        let last_stop = resolver
            .resolve_stop(&last.stop_point_ref)
            .ok_or(NoFuzzyMatch::UnknownStop)?;
        let zone = model.time_zone();
        let service_date = journey
            .framed_vehicle_journey_ref
            .as_ref()
            .map(|f| f.data_frame_ref)
            .unwrap_or_else(|| departure.with_timezone(&zone).date_naive());
        let to_service_time = |t: DateTime<FixedOffset>| {
            ServiceTime::from_instant(&t, service_date, zone).ok_or(NoFuzzyMatch::NoServiceDate)
        };
        let departure = to_service_time(departure)?;
        let arrival = to_service_time(arrival)?;

        let stations: Vec<FeedScopedId> = calls
            .iter()
            .filter_map(|c| resolver.resolve_stop(&c.stop_point_ref))
            .map(|s| s.station_id().clone())
            .collect();

        let key = (last_stop.station_id().clone(), arrival);
        let candidates = self
            .by_last_stop
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut best: Option<(f64, &(Arc<Trip>, Arc<TripPattern>))> = None;
        for candidate in candidates {
            let (trip, pattern) = candidate;
            if !model.runs_on(&trip.service_id, service_date) {
                continue;
            }
            let starts_at_station = pattern
                .stop_pattern()
                .stop(0)
                .is_some_and(|s| s.station_id() == first_stop.station_id());
            let departs_on_time = pattern
                .scheduled_timetable()
                .trip_times_for(&trip.id)
                .is_some_and(|t| t.num_stops() > 0 && t.scheduled_departure(0) == departure);
            if !starts_at_station || !departs_on_time {
                continue;
            }

            let served = stations
                .iter()
                .filter(|s| pattern.stop_pattern().serves_station(s))
                .count();
            let score = served as f64 / calls.len() as f64;
            trace!(trip = %trip.id, score, "fuzzy match candidate");
            let better = match best {
                None => true,
                Some((best_score, (best_trip, _))) => {
                    score > best_score || (score == best_score && trip.id < best_trip.id)
                }
            };
            if better {
                best = Some((score, candidate));
            }
        }

        match best {
            None => Err(NoFuzzyMatch::NoCandidate),
            Some((score, _)) if score < self.min_score => Err(NoFuzzyMatch::ScoreTooLow),
            Some((_, (trip, pattern))) => Ok(FuzzyMatch {
                trip: Arc::clone(trip),
                pattern: Arc::clone(pattern),
                service_date,
            }),
        }
    }
}

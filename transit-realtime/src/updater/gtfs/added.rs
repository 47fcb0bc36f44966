//! Trips added by GTFS-RT, and the stop times of trips given in full.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{debug, warn};

use super::delays::InvalidStopTimeUpdate;
use super::types::{StopScheduleRelationship, StopTimeEvent, StopTimeUpdate, TripUpdate};
use super::{GtfsRealtimeTripUpdateAdapter, invalid};
use crate::domain::{
    Direction, FeedScopedId, PatternStop, PickDrop, RealTimeChange, RealTimeTripTimesBuilder,
    Route, ScheduledStopTime, ServiceTime, StopPattern, TransitMode, Trip, TripAlteration,
    TripOnServiceDate, TripTimes,
};
use crate::snapshot::{RealTimeTripUpdate, TimetableRepository, TimetableSnapshotBuffer};
use crate::updater::{
    ApplyError, TripPatternCache, UpdateError, UpdateErrorType, UpdateSuccess, UpdateWarning,
};

/// Create a trip that is not in the planned schedule.
///
/// Stops the model does not know are dropped with a warning. Applying the
/// same trip again replaces what the previous message staged.
pub(super) fn apply(
    adapter: &GtfsRealtimeTripUpdateAdapter,
    buffer: &mut TimetableSnapshotBuffer,
    cache: &mut TripPatternCache,
    update: &TripUpdate,
    trip_id: FeedScopedId,
) -> Result<UpdateSuccess, ApplyError> {
    let error = |error_type| UpdateError::new(Some(trip_id.clone()), error_type);
    if adapter.model.trip(&trip_id).is_some() {
        return Err(error(UpdateErrorType::TripAlreadyExists).into());
    }
    let Some(Ok(service_date)) = update.trip.service_date() else {
        return Err(error(UpdateErrorType::NoStartDate).into());
    };

    let mut known = Vec::with_capacity(update.stop_time_updates.len());
    let mut stops = Vec::with_capacity(update.stop_time_updates.len());
    for stop_time in &update.stop_time_updates {
        let Some(stop) = stop_time
            .stop_id
            .as_deref()
            .and_then(|s| adapter.model.stop(&adapter.id(s)))
        else {
            continue;
        };
        let mut pattern_stop = PatternStop::new(Arc::clone(stop));
        if stop_time.schedule_relationship == StopScheduleRelationship::Skipped {
            pattern_stop.pickup = PickDrop::Cancelled;
            pattern_stop.dropoff = PickDrop::Cancelled;
        }
        known.push(stop_time);
        stops.push(pattern_stop);
    }

    let mut warnings = Vec::new();
    let removed = update.stop_time_updates.len() - known.len();
    if removed > 0 {
        warn!(trip = %trip_id, removed, "removed unknown stops from added trip");
        warnings.push(UpdateWarning::UnknownStopsRemovedFromAddedTrip);
    }
    match known.len() {
        0 => return Err(error(UpdateErrorType::NoValidStops).into()),
        1 => return Err(error(UpdateErrorType::TooFewStops).into()),
        _ => {}
    }

    let times = stop_times(
        known.iter().copied(),
        None,
        service_date,
        adapter.zone(),
        adapter.max_trip_time,
    )
    .map_err(|e| invalid(&trip_id, e))?;

    let (route, route_created) = resolve_route(adapter, buffer, update, &trip_id)?;
    let trip = Arc::new(Trip {
        id: trip_id.clone(),
        route: Arc::clone(&route),
        service_id: adapter.id(&format!("RT-{}", service_date.format("%Y%m%d"))),
        direction: Direction::Unknown,
        mode: route.mode,
        sub_mode: route.sub_mode.clone(),
        short_name: None,
        alteration: TripAlteration::Extra,
    });
    let trip_times = times
        .into_builder(Arc::clone(&trip))
        .build(RealTimeChange::Added)
        .map_err(|e| UpdateError::from_validation(Some(trip_id.clone()), e))?;
    let pattern = cache.resolve(StopPattern::new(stops), &route, None);

    buffer.revert_trip_to_scheduled_trip_pattern(&trip_id, service_date)?;
    let dated = TripOnServiceDate {
        id: trip_id.clone(),
        trip,
        service_date,
        replacement_for: Vec::new(),
    };
    debug!(
        trip = %trip_id,
        route = %route.id,
        route_created,
        pattern = %pattern.id(),
        date = %service_date,
        "adding trip"
    );
    buffer.update(
        RealTimeTripUpdate::new(pattern, trip_times, service_date)
            .with_added_trip(Arc::new(dated), route_created),
    )?;
    Ok(UpdateSuccess::with_warnings(warnings))
}

/// The descriptor's route, or a new bus route under the feed's first agency.
fn resolve_route(
    adapter: &GtfsRealtimeTripUpdateAdapter,
    buffer: &TimetableSnapshotBuffer,
    update: &TripUpdate,
    trip_id: &FeedScopedId,
) -> Result<(Arc<Route>, bool), UpdateError> {
    let route_id = update.trip.route_id.as_deref().map(|r| adapter.id(r));
    if let Some(id) = &route_id {
        if let Some(route) = adapter.model.route(id).or_else(|| buffer.added_route(id)) {
            return Ok((Arc::clone(route), false));
        }
    }

    let agency = adapter
        .model
        .agencies_for_feed(&adapter.feed_id)
        .first()
        .map(|agency| Arc::clone(agency))
        .ok_or_else(|| {
            UpdateError::new(Some(trip_id.clone()), UpdateErrorType::CannotResolveAgency)
        })?;
    let route = Route {
        id: route_id.unwrap_or_else(|| trip_id.clone()),
        agency,
        operator: None,
        short_name: None,
        mode: TransitMode::Bus,
        sub_mode: None,
        created_by_realtime: true,
    };
    Ok((Arc::new(route), true))
}

/// Planned and real-time times for a trip given stop by stop.
#[derive(Debug)]
pub(super) struct NewStopTimes {
    scheduled: Vec<ScheduledStopTime>,
    realtime: Vec<(ServiceTime, ServiceTime)>,
    skipped: Vec<usize>,
}

impl NewStopTimes {
    pub(super) fn into_builder(self, trip: Arc<Trip>) -> RealTimeTripTimesBuilder {
        let mut builder = RealTimeTripTimesBuilder::new(trip, self.scheduled);
        for (i, (arrival, departure)) in self.realtime.into_iter().enumerate() {
            builder.set_arrival(i, arrival);
            builder.set_departure(i, departure);
        }
        for i in self.skipped {
            builder.cancel_stop(i);
        }
        builder
    }
}

/// Read the times of every stop from its update.
///
/// Planned times come from `scheduled_time`, else from `planned` at the
/// same position, else from the absolute `time`. Real-time times come from
/// `time`, else the planned time plus `delay`. An event missing on one side
/// of a stop is taken from the other side.
pub(super) fn stop_times<'a>(
    updates: impl IntoIterator<Item = &'a StopTimeUpdate>,
    planned: Option<&TripTimes>,
    service_date: NaiveDate,
    zone: Tz,
    max_trip_time: i32,
) -> Result<NewStopTimes, InvalidStopTimeUpdate> {
    let mut times = NewStopTimes {
        scheduled: Vec::new(),
        realtime: Vec::new(),
        skipped: Vec::new(),
    };
    let mut previous_sequence: Option<u32> = None;

    for (i, update) in updates.into_iter().enumerate() {
        let reject = |error_type| InvalidStopTimeUpdate {
            error_type,
            stop_index: Some(i),
        };
        let stop_sequence = match update.stop_sequence {
            Some(sequence) => u32::try_from(sequence)
                .ok()
                .filter(|s| previous_sequence.is_none_or(|p| *s > p))
                .ok_or(reject(UpdateErrorType::InvalidStopSequence))?,
            None => match previous_sequence {
                Some(p) => p
                    .checked_add(1)
                    .ok_or(reject(UpdateErrorType::InvalidStopSequence))?,
                None => 0,
            },
        };
        previous_sequence = Some(stop_sequence);

        let planned = planned
            .filter(|p| i < p.num_stops())
            .map(|p| (p.scheduled_arrival(i), p.scheduled_departure(i)));
        let arrival_event = update.arrival.as_ref().or(update.departure.as_ref());
        let departure_event = update.departure.as_ref().or(update.arrival.as_ref());

        let in_range = |time: ServiceTime| (0..=max_trip_time).contains(&time.seconds());
        let arrival = event_times(arrival_event, planned.map(|p| p.0), service_date, zone)
            .filter(|(s, r)| in_range(*s) && in_range(*r))
            .ok_or(reject(UpdateErrorType::InvalidArrivalTime))?;
        let departure = event_times(departure_event, planned.map(|p| p.1), service_date, zone)
            .filter(|(s, r)| in_range(*s) && in_range(*r))
            .ok_or(reject(UpdateErrorType::InvalidDepartureTime))?;

        times.scheduled.push(ScheduledStopTime {
            arrival: arrival.0,
            departure: departure.0,
            stop_sequence,
        });
        times.realtime.push((arrival.1, departure.1));
        if update.schedule_relationship == StopScheduleRelationship::Skipped {
            times.skipped.push(i);
        }
    }
    Ok(times)
}

/// `(planned, real-time)` for one event.
fn event_times(
    event: Option<&StopTimeEvent>,
    planned: Option<ServiceTime>,
    service_date: NaiveDate,
    zone: Tz,
) -> Option<(ServiceTime, ServiceTime)> {
    let absolute = |epoch| ServiceTime::from_epoch_seconds(epoch, service_date, zone);
    let scheduled = match event.and_then(|e| e.scheduled_time) {
        Some(epoch) => absolute(epoch)?,
        None => match planned {
            Some(planned) => planned,
            None => absolute(event?.time?)?,
        },
    };
    let realtime = match event.map(|e| (e.time, e.delay)) {
        Some((Some(epoch), _)) => absolute(epoch)?,
        Some((None, Some(delay))) => scheduled.checked_add(delay)?,
        _ => scheduled,
    };
    Some((scheduled, realtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, date, t};

    fn absolute(time: &str) -> Option<StopTimeEvent> {
        Some(StopTimeEvent {
            time: Some(at(time).timestamp()),
            ..Default::default()
        })
    }

    fn stop_time(sequence: Option<i64>, arrival: Option<StopTimeEvent>) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_sequence: sequence,
            arrival,
            ..Default::default()
        }
    }

    #[test]
    fn absolute_times_are_planned_and_expected() {
        let updates = [
            stop_time(None, absolute("0:30:00")),
            stop_time(None, absolute("0:40:00")),
        ];
        let times = stop_times(&updates, None, date(), chrono_tz::UTC, 3600).unwrap();

        assert_eq!(times.scheduled[1].arrival, t("0:40"));
        assert_eq!(times.scheduled[1].departure, t("0:40"));
        assert_eq!(times.scheduled[1].stop_sequence, 1);
        assert_eq!(times.realtime[0], (t("0:30"), t("0:30")));
    }

    #[test]
    fn scheduled_time_and_delay() {
        let event = StopTimeEvent {
            scheduled_time: Some(at("0:30:00").timestamp()),
            delay: Some(90),
            ..Default::default()
        };
        let (scheduled, realtime) = event_times(Some(&event), None, date(), chrono_tz::UTC).unwrap();
        assert_eq!(scheduled, t("0:30"));
        assert_eq!(realtime, t("0:31:30"));

        let delay_only = StopTimeEvent {
            delay: Some(60),
            ..Default::default()
        };
        assert_eq!(
            event_times(Some(&delay_only), Some(t("1:00")), date(), chrono_tz::UTC),
            Some((t("1:00"), t("1:01")))
        );
        assert_eq!(event_times(Some(&delay_only), None, date(), chrono_tz::UTC), None);

        let overflowing = StopTimeEvent {
            delay: Some(i32::MAX),
            ..Default::default()
        };
        assert_eq!(
            event_times(Some(&overflowing), Some(t("1:00")), date(), chrono_tz::UTC),
            None
        );
    }

    #[test]
    fn sequences_must_increase() {
        let updates = [
            stop_time(Some(5), absolute("0:30:00")),
            stop_time(Some(5), absolute("0:40:00")),
        ];
        let err = stop_times(&updates, None, date(), chrono_tz::UTC, 3600).unwrap_err();
        assert_eq!(err.error_type, UpdateErrorType::InvalidStopSequence);
        assert_eq!(err.stop_index, Some(1));

        let negative = [stop_time(Some(-1), absolute("0:30:00"))];
        let err = stop_times(&negative, None, date(), chrono_tz::UTC, 3600).unwrap_err();
        assert_eq!(err.stop_index, Some(0));

        let last = [
            stop_time(Some(i64::from(u32::MAX)), absolute("0:30:00")),
            stop_time(None, absolute("0:40:00")),
        ];
        let err = stop_times(&last, None, date(), chrono_tz::UTC, 3600).unwrap_err();
        assert_eq!(err.error_type, UpdateErrorType::InvalidStopSequence);
        assert_eq!(err.stop_index, Some(1));
    }

    #[test]
    fn times_beyond_max_trip_time_are_rejected() {
        let updates = [
            stop_time(None, absolute("0:30:00")),
            stop_time(None, absolute("2:00:00")),
        ];
        let err = stop_times(&updates, None, date(), chrono_tz::UTC, 3600).unwrap_err();
        assert_eq!(err.error_type, UpdateErrorType::InvalidArrivalTime);
        assert_eq!(err.stop_index, Some(1));
    }
}

//! Updates to trips that already exist, planned or added.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use super::JourneyContext;
use super::calls::{apply_call_rules, apply_call_times, is_cancelled_stop};
use super::types::EstimatedVehicleJourney;
use crate::domain::{
    CancelationKind, PatternStop, RealTimeChange, StopPattern, Trip, TripPattern, TripTimes,
};
use crate::snapshot::{RealTimeTripUpdate, TimetableRepository, TimetableSnapshotBuffer};
use crate::updater::{
    ApplyError, TripPatternCache, UpdateError, UpdateErrorType, UpdateSuccess, added_trip_row,
    keep_added_trip,
};
use crate::validate::check_monitored;

/// Apply a journey to a resolved trip.
///
/// A fuzzy match already knows the planned pattern and service date, and
/// passes them in as `matched`.
pub(super) fn apply(
    ctx: &JourneyContext<'_>,
    buffer: &mut TimetableSnapshotBuffer,
    cache: &mut TripPatternCache,
    journey: &EstimatedVehicleJourney,
    trip: Arc<Trip>,
    matched: Option<(Arc<TripPattern>, NaiveDate)>,
) -> Result<UpdateSuccess, ApplyError> {
    let trip_id = Some(&trip.id);
    check_monitored(journey.monitored, journey.cancellation).map_err(|e| {
        UpdateError::from_validation(Some(trip.id.clone()), e).with_producer(ctx.producer)
    })?;

    let (matched_pattern, service_date) = matched.unzip();
    let planned_pattern =
        matched_pattern.or_else(|| ctx.model.pattern_for_trip(&trip.id).cloned());
    let is_added = planned_pattern.is_none();
    let pattern = match planned_pattern {
        Some(pattern) => pattern,
        None => buffer
            .added_pattern_for_trip(&trip.id)
            .cloned()
            .ok_or_else(|| ctx.error(trip_id, UpdateErrorType::TripNotFoundInPattern))?,
    };
    let planned_row = pattern.scheduled_timetable().trip_times_for(&trip.id).cloned();

    let service_date = match service_date {
        Some(date) => date,
        None => ctx
            .resolver
            .resolve_service_date(
                journey,
                planned_row.as_ref().map(|row| row.first_departure()),
                &*buffer,
            )
            .ok_or_else(|| ctx.error(trip_id, UpdateErrorType::NoStartDate))?,
    };

    let base = match planned_row {
        Some(row) => TripTimes::clone(&row),
        None => added_trip_row(buffer, &pattern, &trip.id, service_date)
            .ok_or_else(|| ctx.error(trip_id, UpdateErrorType::TripNotFoundInPattern))?,
    };

    if journey.cancellation {
        return stage_cancellation(ctx, buffer, &pattern, &base, service_date, is_added);
    }

    let stop_pattern = build_stop_pattern(ctx, journey, &trip, &pattern)?;
    if stop_pattern.stops().iter().all(|s| !s.is_routable()) {
        return stage_cancellation(ctx, buffer, &pattern, &base, service_date, is_added);
    }

    let mut builder = base.builder();
    for (i, (recorded, call)) in journey.calls().enumerate() {
        apply_call_times(
            &mut builder,
            i,
            call,
            recorded,
            journey.prediction_inaccurate,
            service_date,
            ctx.zone,
        )
        .map_err(|e| ctx.error(trip_id, e.error_type).with_stop_index(e.stop_index))?;
        if is_cancelled_stop(&stop_pattern.stops()[i]) {
            builder.cancel_stop(i);
        }
    }

    let pattern_changed = stop_pattern != *pattern.stop_pattern();
    let change = if is_added {
        RealTimeChange::Added
    } else if pattern_changed {
        RealTimeChange::Modified
    } else {
        RealTimeChange::Updated
    };
    let trip_times = builder.build(change).map_err(|e| {
        UpdateError::from_validation(Some(trip.id.clone()), e).with_producer(ctx.producer)
    })?;

    buffer.revert_trip_to_scheduled_trip_pattern(&trip.id, service_date)?;
    if pattern_changed && !is_added {
        let deleted = base.cancel(CancelationKind::Deleted);
        buffer.update(
            RealTimeTripUpdate::new(Arc::clone(&pattern), deleted, service_date)
                .with_producer(ctx.producer.map(str::to_string)),
        )?;
    }

    let new_pattern = cache.resolve(stop_pattern, pattern.route(), Some(&pattern));
    debug!(
        trip = %trip.id,
        date = %service_date,
        state = %trip_times.state_kind(),
        pattern = %new_pattern.id(),
        "applied journey update"
    );
    let update = RealTimeTripUpdate::new(new_pattern, trip_times, service_date)
        .with_producer(ctx.producer.map(str::to_string));
    let update = keep_added_trip(buffer, update, &trip, is_added);
    buffer.update(update)?;
    Ok(ctx.success())
}

/// Match calls to the planned stops one by one.
///
/// A call may move to another quay of the planned station; anything else is
/// a mismatch. Inserting or dropping stops is not supported.
fn build_stop_pattern(
    ctx: &JourneyContext<'_>,
    journey: &EstimatedVehicleJourney,
    trip: &Trip,
    pattern: &TripPattern,
) -> Result<StopPattern, UpdateError> {
    let trip_id = Some(&trip.id);
    let call_count = journey.call_count();
    if call_count < 2 {
        return Err(ctx.error(trip_id, UpdateErrorType::TooFewStops));
    }
    if call_count != pattern.num_stops() {
        return Err(ctx.error(trip_id, UpdateErrorType::InvalidStopSequence));
    }

    let mut stops = Vec::with_capacity(call_count);
    for (i, ((_, call), planned)) in journey
        .calls()
        .zip(pattern.stop_pattern().stops())
        .enumerate()
    {
        let stop = ctx
            .resolver
            .resolve_stop(&call.stop_point_ref)
            .ok_or_else(|| ctx.error(trip_id, UpdateErrorType::UnknownStop).with_stop_index(i))?;
        if !stop.is_partner_of(&planned.stop) {
            return Err(ctx
                .error(trip_id, UpdateErrorType::StopMismatch)
                .with_stop_index(i));
        }
        let pattern_stop = PatternStop {
            stop,
            pickup: planned.pickup,
            dropoff: planned.dropoff,
        };
        stops.push(apply_call_rules(pattern_stop, call));
    }
    Ok(StopPattern::new(stops))
}

/// Cancel the trip in the pattern it was planned (or added) on.
fn stage_cancellation(
    ctx: &JourneyContext<'_>,
    buffer: &mut TimetableSnapshotBuffer,
    pattern: &Arc<TripPattern>,
    base: &TripTimes,
    service_date: NaiveDate,
    is_added: bool,
) -> Result<UpdateSuccess, ApplyError> {
    let trip = Arc::clone(base.trip());
    buffer.revert_trip_to_scheduled_trip_pattern(&trip.id, service_date)?;
    let canceled = base.cancel(CancelationKind::Canceled);
    let update = RealTimeTripUpdate::new(Arc::clone(pattern), canceled, service_date)
        .with_producer(ctx.producer.map(str::to_string));
    let update = keep_added_trip(buffer, update, &trip, is_added);
    buffer.update(update)?;
    debug!(trip = %trip.id, date = %service_date, "cancelled trip");
    Ok(ctx.success())
}

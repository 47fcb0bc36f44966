//! GTFS-RT trip updates.
//!
//! The descriptor's schedule relationship picks the handler: planned trips
//! get delays or skipped stops, cancellations replace the row with a
//! cancelled one, added trips are created, and replacements swap the whole
//! stop list of a planned trip.

mod added;
mod delays;
mod types;

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{debug, info, trace};

pub use types::{
    StopScheduleRelationship, StopTimeEvent, StopTimeUpdate, TripDescriptor,
    TripScheduleRelationship, TripUpdate,
};

use self::delays::{InvalidStopTimeUpdate, apply_stop_time_updates};
use super::{
    ApplyError, Incrementality, TripPatternCache, UpdateError, UpdateErrorType, UpdateResult,
    UpdateSuccess, added_trip_row, keep_added_trip, record_outcome,
};
use crate::config::{BackwardsDelayPropagation, EngineConfig};
use crate::domain::{
    CancelationKind, FeedScopedId, PatternStop, PickDrop, RealTimeChange,
    RealTimeTripTimesBuilder, StopPattern, TripPattern, TripTimes,
};
use crate::schedule::TransitModel;
use crate::snapshot::{
    ConcurrentModification, RealTimeTripUpdate, TimetableRepository, TimetableSnapshotBuffer,
};

/// Applies GTFS-RT trip updates of one feed.
#[derive(Debug)]
pub struct GtfsRealtimeTripUpdateAdapter {
    model: Arc<TransitModel>,
    feed_id: String,
    backwards: BackwardsDelayPropagation,
    max_trip_time: i32,
}

impl GtfsRealtimeTripUpdateAdapter {
    pub fn new(model: Arc<TransitModel>, config: &EngineConfig) -> Self {
        Self {
            model,
            feed_id: config.feed_id.clone(),
            backwards: config.backwards_delay_propagation,
            max_trip_time: config.max_trip_time_secs,
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    fn zone(&self) -> Tz {
        self.model.time_zone()
    }

    fn id(&self, id: &str) -> FeedScopedId {
        FeedScopedId::new(self.feed_id.as_str(), id)
    }

    /// Apply one feed message worth of trip updates.
    ///
    /// `today` is the local service date used for descriptors without a
    /// start date. Withdrawn entities are skipped without a result.
    pub fn apply_trip_updates(
        &self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        incrementality: Incrementality,
        updates: &[TripUpdate],
        today: NaiveDate,
    ) -> Result<UpdateResult, ConcurrentModification> {
        if incrementality == Incrementality::FullDataset {
            buffer.clear(&self.feed_id)?;
            cache.clear_feed(&self.feed_id);
        }

        let mut result = UpdateResult::empty();
        for update in updates {
            if update.is_deleted {
                trace!(entity = %update.id, "skipping deleted entity");
                continue;
            }
            let outcome = self.apply_trip_update(buffer, cache, update, today);
            record_outcome(&mut result, outcome)?;
        }
        info!(
            feed = %self.feed_id,
            updates = updates.len(),
            %result,
            "applied trip updates"
        );
        Ok(result)
    }

    fn apply_trip_update(
        &self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        update: &TripUpdate,
        today: NaiveDate,
    ) -> Result<UpdateSuccess, ApplyError> {
        let Some(trip_id) = update.trip.trip_id.as_deref() else {
            return Err(UpdateError::no_trip_id(UpdateErrorType::TripNotFound).into());
        };
        let trip_id = self.id(trip_id);

        let kind = match update.trip.schedule_relationship {
            TripScheduleRelationship::Added | TripScheduleRelationship::New => {
                return added::apply(self, buffer, cache, update, trip_id);
            }
            TripScheduleRelationship::Unscheduled => {
                return Err(UpdateError::new(
                    Some(trip_id),
                    UpdateErrorType::NotImplementedUnscheduled,
                )
                .into());
            }
            TripScheduleRelationship::Duplicated => {
                return Err(UpdateError::new(
                    Some(trip_id),
                    UpdateErrorType::NotImplementedDuplicated,
                )
                .into());
            }
            kind => kind,
        };

        let service_date = match update.trip.service_date() {
            Some(Ok(date)) => date,
            Some(Err(_)) => {
                return Err(UpdateError::new(Some(trip_id), UpdateErrorType::NoStartDate).into());
            }
            None => today,
        };

        match kind {
            TripScheduleRelationship::Canceled => {
                self.cancel(buffer, trip_id, service_date, CancelationKind::Canceled)
            }
            TripScheduleRelationship::Deleted => {
                self.cancel(buffer, trip_id, service_date, CancelationKind::Deleted)
            }
            TripScheduleRelationship::Replacement => {
                self.replace(buffer, cache, update, trip_id, service_date)
            }
            _ => self.apply_delays(buffer, cache, update, trip_id, service_date),
        }
    }

    /// The planned pattern and row of a trip that runs on `service_date`.
    fn planned(
        &self,
        trip_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> Result<(&Arc<TripPattern>, &Arc<TripTimes>), UpdateError> {
        let error = |error_type| UpdateError::new(Some(trip_id.clone()), error_type);
        let trip = self
            .model
            .trip(trip_id)
            .ok_or_else(|| error(UpdateErrorType::TripNotFound))?;
        if !self.model.runs_on(&trip.service_id, service_date) {
            return Err(error(UpdateErrorType::NoServiceOnDate));
        }
        let pattern = self
            .model
            .pattern_for_trip(trip_id)
            .ok_or_else(|| error(UpdateErrorType::TripNotFoundInPattern))?;
        let row = pattern
            .scheduled_timetable()
            .trip_times_for(trip_id)
            .ok_or_else(|| error(UpdateErrorType::TripNotFoundInPattern))?;
        Ok((pattern, row))
    }

    /// Delays and skipped stops for a planned trip.
    fn apply_delays(
        &self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        update: &TripUpdate,
        trip_id: FeedScopedId,
        service_date: NaiveDate,
    ) -> Result<UpdateSuccess, ApplyError> {
        let (pattern, planned) = self.planned(&trip_id, service_date)?;
        if update.stop_time_updates.is_empty() {
            return Err(UpdateError::new(Some(trip_id), UpdateErrorType::NoUpdates).into());
        }

        let mut builder = planned.builder();
        let skipped = apply_stop_time_updates(
            &mut builder,
            pattern.stop_pattern(),
            &update.stop_time_updates,
            service_date,
            self.zone(),
            self.backwards,
        )
        .map_err(|e| invalid(&trip_id, e))?;

        let mut stops = pattern.stop_pattern().stops().to_vec();
        for &i in &skipped {
            stops[i].pickup = PickDrop::Cancelled;
            stops[i].dropoff = PickDrop::Cancelled;
        }
        self.stage_on_pattern(
            buffer,
            cache,
            pattern,
            planned,
            builder,
            StopPattern::new(stops),
            service_date,
        )
    }

    /// Replace the stop list of a planned trip.
    fn replace(
        &self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        update: &TripUpdate,
        trip_id: FeedScopedId,
        service_date: NaiveDate,
    ) -> Result<UpdateSuccess, ApplyError> {
        let (pattern, planned) = self.planned(&trip_id, service_date)?;
        let error = |error_type| UpdateError::new(Some(trip_id.clone()), error_type);
        if update.stop_time_updates.len() < 2 {
            return Err(error(UpdateErrorType::TooFewStops).into());
        }

        let mut stops = Vec::with_capacity(update.stop_time_updates.len());
        for (i, stop_time) in update.stop_time_updates.iter().enumerate() {
            let stop = stop_time
                .stop_id
                .as_deref()
                .and_then(|s| self.model.stop(&self.id(s)))
                .ok_or_else(|| error(UpdateErrorType::UnknownStop).with_stop_index(i))?;
            let mut pattern_stop = PatternStop::new(Arc::clone(stop));
            if stop_time.schedule_relationship == StopScheduleRelationship::Skipped {
                pattern_stop.pickup = PickDrop::Cancelled;
                pattern_stop.dropoff = PickDrop::Cancelled;
            }
            stops.push(pattern_stop);
        }

        let times = added::stop_times(
            &update.stop_time_updates,
            Some(planned),
            service_date,
            self.zone(),
            self.max_trip_time,
        )
        .map_err(|e| invalid(&trip_id, e))?;
        let builder = times.into_builder(Arc::clone(planned.trip()));
        self.stage_on_pattern(
            buffer,
            cache,
            pattern,
            planned,
            builder,
            StopPattern::new(stops),
            service_date,
        )
    }

    /// Stage a planned trip's new row.
    ///
    /// When `stops` differs from the planned pattern the row goes to a
    /// real-time pattern and the planned row is marked deleted.
    #[allow(clippy::too_many_arguments)]
    fn stage_on_pattern(
        &self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        pattern: &Arc<TripPattern>,
        planned: &TripTimes,
        builder: RealTimeTripTimesBuilder,
        stops: StopPattern,
        service_date: NaiveDate,
    ) -> Result<UpdateSuccess, ApplyError> {
        let trip_id = planned.trip_id();
        let moved = stops != *pattern.stop_pattern();
        let change = if moved {
            RealTimeChange::Modified
        } else {
            RealTimeChange::Updated
        };
        let trip_times = builder
            .build(change)
            .map_err(|e| UpdateError::from_validation(Some(trip_id.clone()), e))?;

        let target = cache.resolve(stops, pattern.route(), Some(pattern));
        buffer.revert_trip_to_scheduled_trip_pattern(trip_id, service_date)?;
        if moved {
            buffer.update(RealTimeTripUpdate::new(
                Arc::clone(pattern),
                planned.cancel(CancelationKind::Deleted),
                service_date,
            ))?;
        }
        debug!(
            trip = %trip_id,
            date = %service_date,
            state = %trip_times.state_kind(),
            pattern = %target.id(),
            "applied trip update"
        );
        buffer.update(RealTimeTripUpdate::new(target, trip_times, service_date))?;
        Ok(UpdateSuccess::no_warnings())
    }

    /// Cancel a planned trip, or else a trip added earlier.
    fn cancel(
        &self,
        buffer: &mut TimetableSnapshotBuffer,
        trip_id: FeedScopedId,
        service_date: NaiveDate,
        kind: CancelationKind,
    ) -> Result<UpdateSuccess, ApplyError> {
        let planned = self.model.pattern_for_trip(&trip_id).and_then(|pattern| {
            let row = pattern.scheduled_timetable().trip_times_for(&trip_id)?;
            Some((Arc::clone(pattern), TripTimes::clone(row)))
        });
        if let Some((pattern, row)) = planned {
            buffer.revert_trip_to_scheduled_trip_pattern(&trip_id, service_date)?;
            buffer.update(RealTimeTripUpdate::new(pattern, row.cancel(kind), service_date))?;
            debug!(trip = %trip_id, date = %service_date, ?kind, "cancelled planned trip");
            return Ok(UpdateSuccess::no_warnings());
        }

        let added = match buffer.added_pattern_for_trip(&trip_id).cloned() {
            Some(pattern) => added_trip_row(buffer, &pattern, &trip_id, service_date)
                .map(|row| (pattern, row)),
            None => None,
        };
        let Some((pattern, row)) = added else {
            return Err(
                UpdateError::new(Some(trip_id), UpdateErrorType::NoTripForCancellationFound).into(),
            );
        };
        let trip = Arc::clone(row.trip());
        buffer.revert_trip_to_scheduled_trip_pattern(&trip_id, service_date)?;
        let update = RealTimeTripUpdate::new(pattern, row.cancel(kind), service_date);
        let update = keep_added_trip(buffer, update, &trip, true);
        buffer.update(update)?;
        debug!(trip = %trip_id, date = %service_date, ?kind, "cancelled added trip");
        Ok(UpdateSuccess::no_warnings())
    }
}

fn invalid(trip_id: &FeedScopedId, err: InvalidStopTimeUpdate) -> UpdateError {
    let error = UpdateError::new(Some(trip_id.clone()), err.error_type);
    match err.stop_index {
        Some(i) => error.with_stop_index(i),
        None => error,
    }
}

#[cfg(test)]
mod tests;

//! Applying real-time messages to the snapshot buffer.
//!
//! Adapters turn each entity of a batch into at most one complete trip
//! update: resolve the trip, build and validate its times, find its
//! pattern and stage the result. Entity failures are collected in an
//! [`UpdateResult`]; only a [`ConcurrentModification`] aborts a batch.

pub mod gtfs;
mod matcher;
mod patterns;
mod result;
pub mod siri;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

pub use matcher::{EntityResolver, FuzzyMatch, NoFuzzyMatch, SiriFuzzyTripMatcher};
pub use patterns::TripPatternCache;
pub use result::{UpdateError, UpdateErrorType, UpdateResult, UpdateSuccess, UpdateWarning};

use crate::domain::{FeedScopedId, Trip, TripOnServiceDate, TripPattern, TripTimes};
use crate::snapshot::{
    ConcurrentModification, RealTimeTripUpdate, TimetableRepository, TimetableSnapshotBuffer,
};

/// Whether a batch carries the whole feed or only changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Incrementality {
    /// Everything staged for the feed is dropped before the batch applies.
    FullDataset,
    #[default]
    Differential,
}

/// Failure while applying one entity.
#[derive(Debug)]
pub(crate) enum ApplyError {
    Entity(UpdateError),
    Buffer(ConcurrentModification),
}

impl From<UpdateError> for ApplyError {
    fn from(err: UpdateError) -> Self {
        ApplyError::Entity(err)
    }
}

impl From<ConcurrentModification> for ApplyError {
    fn from(err: ConcurrentModification) -> Self {
        ApplyError::Buffer(err)
    }
}

/// Add one entity's outcome to the batch result.
///
/// Entity errors are logged and recorded; buffer errors end the batch.
pub(crate) fn record_outcome(
    result: &mut UpdateResult,
    outcome: Result<UpdateSuccess, ApplyError>,
) -> Result<(), ConcurrentModification> {
    match outcome {
        Ok(success) => result.record(Ok(success)),
        Err(ApplyError::Entity(error)) => {
            debug!(
                trip = ?error.trip_id.as_ref().map(ToString::to_string),
                error = %error.error_type,
                stop_index = ?error.stop_index,
                producer = error.producer.as_deref().unwrap_or("-"),
                "trip update rejected"
            );
            result.record(Err(error));
        }
        Err(ApplyError::Buffer(err)) => return Err(err),
    }
    Ok(())
}

/// The planned half of an added trip's row: its aimed times.
///
/// Looked up on the service date first, then on any other date the trip
/// was added for.
pub(crate) fn added_trip_row(
    buffer: &TimetableSnapshotBuffer,
    pattern: &TripPattern,
    trip_id: &FeedScopedId,
    service_date: NaiveDate,
) -> Option<TripTimes> {
    if let Some(row) = buffer
        .realtime_timetable(pattern.id(), service_date)
        .and_then(|t| t.trip_times_for(trip_id))
    {
        return Some(row.to_scheduled());
    }
    buffer
        .timetables()
        .get(pattern.id())?
        .iter()
        .find_map(|(_, t)| t.trip_times_for(trip_id).map(|row| row.to_scheduled()))
}

/// Keep the added-trip indexes pointing at the trip's latest pattern.
pub(crate) fn keep_added_trip(
    buffer: &TimetableSnapshotBuffer,
    update: RealTimeTripUpdate,
    trip: &Arc<Trip>,
    is_added: bool,
) -> RealTimeTripUpdate {
    if !is_added {
        return update;
    }
    let service_date = update.service_date;
    let dated = match buffer.added_trip_on_service_date(&trip.id, service_date) {
        Some(dated) => Arc::clone(dated),
        None => Arc::new(TripOnServiceDate {
            id: trip.id.clone(),
            trip: Arc::clone(trip),
            service_date,
            replacement_for: Vec::new(),
        }),
    };
    update.with_added_trip(dated, false)
}

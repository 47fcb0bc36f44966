//! SIRI estimated timetable (SIRI-ET) updates.
//!
//! Each [`EstimatedVehicleJourney`] either updates a known trip (planned or
//! previously added), or, when flagged as an extra journey that resolves
//! to nothing, adds a new trip. With fuzzy matching enabled for a batch,
//! unresolved journeys are matched to planned trips by time and place.

mod added;
mod calls;
mod modified;
mod types;

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{info, trace};

pub use types::{
    ArrivalBoardingActivity, Call, CallStatus, DepartureBoardingActivity, EstimatedVehicleJourney,
    FramedVehicleJourneyRef, VehicleMode,
};

use super::{
    ApplyError, EntityResolver, Incrementality, SiriFuzzyTripMatcher, TripPatternCache,
    UpdateError, UpdateErrorType, UpdateResult, UpdateSuccess, record_outcome,
};
use crate::config::EngineConfig;
use crate::domain::FeedScopedId;
use crate::schedule::TransitModel;
use crate::snapshot::{ConcurrentModification, TimetableSnapshotBuffer};

/// What the per-journey handlers need besides the buffer and cache.
struct JourneyContext<'a> {
    model: &'a TransitModel,
    resolver: EntityResolver<'a>,
    zone: Tz,
    producer: Option<&'a str>,
}

impl JourneyContext<'_> {
    fn error(&self, trip_id: Option<&FeedScopedId>, error_type: UpdateErrorType) -> UpdateError {
        UpdateError::new(trip_id.cloned(), error_type).with_producer(self.producer)
    }

    fn success(&self) -> UpdateSuccess {
        UpdateSuccess::no_warnings().with_producer(self.producer)
    }
}

/// Applies SIRI-ET journeys of one feed.
#[derive(Debug)]
pub struct SiriTripUpdateAdapter {
    model: Arc<TransitModel>,
    feed_id: String,
    fuzzy_min_score: f64,
    /// Built on the first batch that asks for fuzzy matching.
    fuzzy_matcher: Option<SiriFuzzyTripMatcher>,
}

impl SiriTripUpdateAdapter {
    pub fn new(model: Arc<TransitModel>, config: &EngineConfig) -> Self {
        Self {
            model,
            feed_id: config.feed_id.clone(),
            fuzzy_min_score: config.fuzzy_min_score,
            fuzzy_matcher: None,
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    /// Apply one delivery of journeys.
    ///
    /// A full dataset first drops everything staged for the feed. Every
    /// journey yields one success or one error in the result.
    pub fn apply_estimated_timetable(
        &mut self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        incrementality: Incrementality,
        journeys: &[EstimatedVehicleJourney],
        fuzzy_matching: bool,
    ) -> Result<UpdateResult, ConcurrentModification> {
        if incrementality == Incrementality::FullDataset {
            buffer.clear(&self.feed_id)?;
            cache.clear_feed(&self.feed_id);
        }

        let mut result = UpdateResult::empty();
        for journey in journeys {
            let outcome = self.apply_journey(buffer, cache, journey, fuzzy_matching);
            record_outcome(&mut result, outcome)?;
        }
        info!(
            feed = %self.feed_id,
            journeys = journeys.len(),
            %result,
            "applied estimated timetable"
        );
        Ok(result)
    }

    fn apply_journey(
        &mut self,
        buffer: &mut TimetableSnapshotBuffer,
        cache: &mut TripPatternCache,
        journey: &EstimatedVehicleJourney,
        fuzzy_matching: bool,
    ) -> Result<UpdateSuccess, ApplyError> {
        let model = Arc::clone(&self.model);
        let resolver = EntityResolver::new(&model, &self.feed_id);
        let ctx = JourneyContext {
            model: &model,
            resolver,
            zone: model.time_zone(),
            producer: journey.data_source.as_deref(),
        };
        let reference = journey.reference().map(|r| resolver.resolve_id(r));

        if journey.calls().any(|(_, call)| call.extra_call) {
            return Err(ctx
                .error(reference.as_ref(), UpdateErrorType::NotImplementedExtraCall)
                .into());
        }
        if let Some(index) = journey
            .calls()
            .position(|(_, call)| call.stop_point_ref.trim().is_empty())
        {
            return Err(ctx
                .error(reference.as_ref(), UpdateErrorType::EmptyStopPointRef)
                .with_stop_index(index)
                .into());
        }

        if let Some(trip) = resolver.resolve_trip(journey, &*buffer) {
            return modified::apply(&ctx, buffer, cache, journey, trip, None);
        }
        if journey.extra_journey {
            return added::apply(&ctx, buffer, cache, journey);
        }
        if fuzzy_matching {
            let min_score = self.fuzzy_min_score;
            let matcher = self
                .fuzzy_matcher
                .get_or_insert_with(|| SiriFuzzyTripMatcher::new(&model, min_score));
            return match matcher.match_journey(journey, &model, &resolver) {
                Ok(found) => modified::apply(
                    &ctx,
                    buffer,
                    cache,
                    journey,
                    found.trip,
                    Some((found.pattern, found.service_date)),
                ),
                Err(reason) => {
                    trace!(?reason, reference = ?journey.reference(), "no fuzzy trip match");
                    Err(ctx
                        .error(reference.as_ref(), UpdateErrorType::NoFuzzyTripMatch)
                        .into())
                }
            };
        }
        Err(ctx
            .error(reference.as_ref(), UpdateErrorType::TripNotFound)
            .into())
    }
}

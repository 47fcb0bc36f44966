//! Extra journeys: trips that are not in the planned schedule.

use std::sync::Arc;

use tracing::debug;

use super::JourneyContext;
use super::calls::{aimed_times, apply_call_rules, apply_call_times, is_cancelled_stop};
use super::types::{EstimatedVehicleJourney, VehicleMode};
use crate::domain::{
    Agency, CancelationKind, Direction, FeedScopedId, PatternStop, RealTimeChange,
    RealTimeTripTimesBuilder, Route, ScheduledStopTime, StopPattern, TransitMode, Trip,
    TripAlteration, TripOnServiceDate,
};
use crate::snapshot::{RealTimeTripUpdate, TimetableSnapshotBuffer};
use crate::updater::{ApplyError, TripPatternCache, UpdateError, UpdateErrorType, UpdateSuccess};
use crate::validate::{check_monitored, validate_times};

const REPLACEMENT_RAIL_SERVICE: &str = "replacementRailService";
const RAIL_REPLACEMENT_BUS: &str = "railReplacementBus";

/// Create a trip, and its route if needed, for an extra journey.
///
/// The journey code becomes the trip id. Aimed times make up the planned
/// half of the row, expected and actual times the real-time half.
pub(super) fn apply(
    ctx: &JourneyContext<'_>,
    buffer: &mut TimetableSnapshotBuffer,
    cache: &mut TripPatternCache,
    journey: &EstimatedVehicleJourney,
) -> Result<UpdateSuccess, ApplyError> {
    let (Some(code), Some(operator_ref), Some(line_ref)) = (
        journey.estimated_vehicle_journey_code.as_deref(),
        journey.operator_ref.as_deref(),
        journey.line_ref.as_deref(),
    ) else {
        return Err(ctx.error(None, UpdateErrorType::Unknown).into());
    };
    let trip_id = ctx.resolver.resolve_id(code);
    let error = |error_type| ctx.error(Some(&trip_id), error_type);

    check_monitored(journey.monitored, journey.cancellation).map_err(|e| {
        UpdateError::from_validation(Some(trip_id.clone()), e).with_producer(ctx.producer)
    })?;
    let call_count = journey.call_count();
    if call_count < 2 {
        return Err(error(UpdateErrorType::TooFewStops).into());
    }
    let service_date = ctx
        .resolver
        .resolve_service_date(journey, None, &*buffer)
        .ok_or_else(|| error(UpdateErrorType::NoStartDate))?;

    let replaced_route = journey
        .external_line_ref
        .as_deref()
        .and_then(|line| ctx.resolver.resolve_route(line, &*buffer));
    let (route, route_created) = match ctx.resolver.resolve_route(line_ref, &*buffer) {
        Some(route) => (route, false),
        None => {
            let operator_id = ctx.resolver.resolve_id(operator_ref);
            let agency = agency_for_operator(ctx, &operator_id)
                .or_else(|| replaced_route.as_ref().map(|r| Arc::clone(&r.agency)))
                .ok_or_else(|| error(UpdateErrorType::CannotResolveAgency))?;
            let mode = journey
                .vehicle_mode
                .and_then(transit_mode)
                .or(replaced_route.as_ref().map(|r| r.mode))
                .unwrap_or(TransitMode::Bus);
            let route = Route {
                id: ctx.resolver.resolve_id(line_ref),
                agency,
                operator: ctx.model.operator(&operator_id).cloned(),
                short_name: journey.published_line_name.clone(),
                mode,
                sub_mode: replacement_sub_mode(replaced_route.as_deref(), mode),
                created_by_realtime: true,
            };
            (Arc::new(route), true)
        }
    };

    let mode = journey
        .vehicle_mode
        .and_then(transit_mode)
        .unwrap_or(route.mode);
    let replacement_refs: Vec<&str> = journey
        .vehicle_journey_ref
        .iter()
        .chain(&journey.additional_vehicle_journey_refs)
        .map(String::as_str)
        .collect();
    let trip = Arc::new(Trip {
        id: trip_id.clone(),
        route: Arc::clone(&route),
        service_id: FeedScopedId::new(
            route.id.feed_id(),
            format!("RT-{}", service_date.format("%Y%m%d")),
        ),
        direction: Direction::Unknown,
        mode,
        sub_mode: replacement_sub_mode(replaced_route.as_deref(), mode)
            .or_else(|| route.sub_mode.clone()),
        short_name: journey.published_line_name.clone(),
        alteration: if replacement_refs.is_empty() {
            TripAlteration::Extra
        } else {
            TripAlteration::Replaced
        },
    });

    let mut stops = Vec::with_capacity(call_count);
    let mut aimed = Vec::with_capacity(call_count);
    for (i, (_, call)) in journey.calls().enumerate() {
        let stop = ctx
            .resolver
            .resolve_stop(&call.stop_point_ref)
            .ok_or_else(|| error(UpdateErrorType::UnknownStop).with_stop_index(i))?;
        stops.push(apply_call_rules(PatternStop::new(stop), call));
        let (arrival, departure) = aimed_times(call, i, call_count, service_date, ctx.zone)
            .map_err(|e| error(e.error_type).with_stop_index(e.stop_index))?;
        aimed.push(ScheduledStopTime {
            arrival,
            departure,
            stop_sequence: i as u32,
        });
    }
    validate_times(aimed.iter().map(|s| (s.arrival, s.departure))).map_err(|e| {
        UpdateError::from_validation(Some(trip_id.clone()), e).with_producer(ctx.producer)
    })?;

    let mut builder = RealTimeTripTimesBuilder::new(Arc::clone(&trip), aimed);
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
        .map_err(|e| error(e.error_type).with_stop_index(e.stop_index))?;
        if is_cancelled_stop(&stops[i]) {
            builder.cancel_stop(i);
        }
    }
    let mut trip_times = builder.build(RealTimeChange::Added).map_err(|e| {
        UpdateError::from_validation(Some(trip_id.clone()), e).with_producer(ctx.producer)
    })?;
    if journey.cancellation || stops.iter().all(|s| !s.is_routable()) {
        trip_times = trip_times.cancel(CancelationKind::Canceled);
    }

    let pattern = cache.resolve(StopPattern::new(stops), &route, None);
    let replacement_for = replacement_refs
        .iter()
        .filter_map(|r| ctx.resolver.resolve_trip_on_service_date(r, &*buffer))
        .map(|dated| dated.id.clone())
        .collect();
    let dated = TripOnServiceDate {
        id: trip_id.clone(),
        trip: Arc::clone(&trip),
        service_date,
        replacement_for,
    };

    debug!(
        trip = %trip_id,
        route = %route.id,
        route_created,
        pattern = %pattern.id(),
        date = %service_date,
        "adding extra journey"
    );
    buffer.update(
        RealTimeTripUpdate::new(pattern, trip_times, service_date)
            .with_added_trip(Arc::new(dated), route_created)
            .with_producer(ctx.producer.map(str::to_string)),
    )?;
    Ok(ctx.success())
}

/// The agency of the first planned route, by id, run by the operator.
fn agency_for_operator(ctx: &JourneyContext<'_>, operator_id: &FeedScopedId) -> Option<Arc<Agency>> {
    let mut routes: Vec<&Arc<Route>> = ctx
        .model
        .routes()
        .filter(|r| r.is_operated_by(operator_id))
        .collect();
    routes.sort_by(|a, b| a.id.cmp(&b.id));
    routes.first().map(|r| Arc::clone(&r.agency))
}

fn transit_mode(mode: VehicleMode) -> Option<TransitMode> {
    match mode {
        VehicleMode::Air => Some(TransitMode::Air),
        VehicleMode::Bus => Some(TransitMode::Bus),
        VehicleMode::Coach => Some(TransitMode::Coach),
        VehicleMode::Ferry => Some(TransitMode::Ferry),
        VehicleMode::Metro => Some(TransitMode::Metro),
        VehicleMode::Rail => Some(TransitMode::Rail),
        VehicleMode::Tram => Some(TransitMode::Tram),
        VehicleMode::Other => None,
    }
}

/// Sub-mode for a journey replacing a rail line.
fn replacement_sub_mode(replaced: Option<&Route>, mode: TransitMode) -> Option<String> {
    if replaced?.mode != TransitMode::Rail {
        return None;
    }
    match mode {
        TransitMode::Rail => Some(REPLACEMENT_RAIL_SERVICE.to_string()),
        TransitMode::Bus => Some(RAIL_REPLACEMENT_BUS.to_string()),
        _ => None,
    }
}

//! Conversion from schedule DTOs to the transit model.

use std::collections::HashMap;
use std::sync::Arc;

use chrono_tz::Tz;

use crate::domain::{
    Agency, FeedScopedId, Operator, PatternStop, Route, ScheduledStopTime, ServiceTime, Stop,
    StopPattern, Timetable, Trip, TripOnServiceDate, TripPattern, TripTimes,
};
use crate::validate::ValidationError;

use super::model::TransitModel;
use super::types::{PatternDto, ScheduleFile, TripDto};

/// Error during DTO to model conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    /// Failed to parse a feed-scoped id
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// Unknown IANA time zone
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    /// Failed to parse a time string
    #[error("invalid time: {0}")]
    InvalidTime(String),

    /// A reference to an entity that is not defined
    #[error("unknown {kind} referenced: {id}")]
    UnknownReference { kind: &'static str, id: String },

    /// Trip has a different number of stop times than its pattern has stops
    #[error("trip {trip} has {actual} stop times, pattern has {expected} stops")]
    StopCountMismatch {
        trip: String,
        expected: usize,
        actual: usize,
    },

    /// Planned times are physically impossible
    #[error("trip {trip}: {source}")]
    InvalidTimes {
        trip: String,
        source: ValidationError,
    },
}

fn parse_id(s: &str) -> Result<FeedScopedId, ConversionError> {
    FeedScopedId::parse(s).map_err(|_| ConversionError::InvalidId(s.to_string()))
}

fn parse_time(s: &str) -> Result<ServiceTime, ConversionError> {
    ServiceTime::parse(s).map_err(|_| ConversionError::InvalidTime(s.to_string()))
}

/// Convert a schedule file into a transit model.
pub fn convert_schedule(file: &ScheduleFile) -> Result<TransitModel, ConversionError> {
    let time_zone: Tz = file
        .time_zone
        .parse()
        .map_err(|_| ConversionError::UnknownTimeZone(file.time_zone.clone()))?;

    let mut agencies = HashMap::new();
    for dto in &file.agencies {
        let agency = Arc::new(Agency {
            id: parse_id(&dto.id)?,
            name: dto.name.clone(),
        });
        agencies.insert(agency.id.clone(), agency);
    }

    let mut operators = HashMap::new();
    for dto in &file.operators {
        let operator = Arc::new(Operator {
            id: parse_id(&dto.id)?,
            name: dto.name.clone(),
        });
        operators.insert(operator.id.clone(), operator);
    }

    let mut stops = HashMap::new();
    for dto in &file.stops {
        let stop = Arc::new(Stop {
            id: parse_id(&dto.id)?,
            name: dto.name.clone(),
            parent_station: dto.parent_station.as_deref().map(parse_id).transpose()?,
        });
        stops.insert(stop.id.clone(), stop);
    }

    let mut routes = HashMap::new();
    for dto in &file.routes {
        let agency_id = parse_id(&dto.agency)?;
        let agency = agencies
            .get(&agency_id)
            .cloned()
            .ok_or_else(|| unknown("agency", &dto.agency))?;
        let operator = match &dto.operator {
            Some(op) => Some(
                operators
                    .get(&parse_id(op)?)
                    .cloned()
                    .ok_or_else(|| unknown("operator", op))?,
            ),
            None => None,
        };
        let route = Arc::new(Route {
            id: parse_id(&dto.id)?,
            agency,
            operator,
            short_name: dto.short_name.clone(),
            mode: dto.mode,
            sub_mode: dto.sub_mode.clone(),
            created_by_realtime: false,
        });
        routes.insert(route.id.clone(), route);
    }

    let mut builder = TransitModel::builder(time_zone);
    for agency in agencies.values() {
        builder = builder.agency(Agency::clone(agency));
    }
    for operator in operators.values() {
        builder = builder.operator(Operator::clone(operator));
    }
    for stop in stops.values() {
        builder = builder.stop(Arc::clone(stop));
    }
    for route in routes.values() {
        builder = builder.route(Arc::clone(route));
    }
    for calendar in &file.calendars {
        let service_id = parse_id(&calendar.service_id)?;
        for date in &calendar.dates {
            builder = builder.service_date(service_id.clone(), *date);
        }
    }

    let mut trips = HashMap::new();
    for dto in &file.patterns {
        let pattern = convert_pattern(dto, &routes, &stops)?;
        for trip_times in pattern.scheduled_timetable().trip_times() {
            trips.insert(trip_times.trip_id().clone(), Arc::clone(trip_times.trip()));
        }
        builder = builder.pattern(pattern);
    }

    for dto in &file.dated_trips {
        let trip = trips
            .get(&parse_id(&dto.trip)?)
            .cloned()
            .ok_or_else(|| unknown("trip", &dto.trip))?;
        let replacement_for = dto
            .replacement_for
            .iter()
            .map(|id| parse_id(id))
            .collect::<Result<_, _>>()?;
        builder = builder.trip_on_service_date(TripOnServiceDate {
            id: parse_id(&dto.id)?,
            trip,
            service_date: dto.service_date,
            replacement_for,
        });
    }

    Ok(builder.build())
}

fn unknown(kind: &'static str, id: &str) -> ConversionError {
    ConversionError::UnknownReference {
        kind,
        id: id.to_string(),
    }
}

fn convert_pattern(
    dto: &PatternDto,
    routes: &HashMap<FeedScopedId, Arc<Route>>,
    stops: &HashMap<FeedScopedId, Arc<Stop>>,
) -> Result<TripPattern, ConversionError> {
    let id = parse_id(&dto.id)?;
    let route = routes
        .get(&parse_id(&dto.route)?)
        .cloned()
        .ok_or_else(|| unknown("route", &dto.route))?;

    let pattern_stops = dto
        .stops
        .iter()
        .map(|s| {
            let stop = stops
                .get(&parse_id(&s.stop)?)
                .cloned()
                .ok_or_else(|| unknown("stop", &s.stop))?;
            Ok(PatternStop {
                stop,
                pickup: s.pickup,
                dropoff: s.dropoff,
            })
        })
        .collect::<Result<Vec<_>, ConversionError>>()?;

    let trip_times = dto
        .trips
        .iter()
        .map(|t| convert_trip(t, &route, pattern_stops.len()))
        .collect::<Result<Vec<_>, _>>()?;

    let timetable = Timetable::from_trip_times(id.clone(), None, trip_times);
    Ok(TripPattern::new(
        id,
        route,
        StopPattern::new(pattern_stops),
        timetable,
    ))
}

fn convert_trip(
    dto: &TripDto,
    route: &Arc<Route>,
    num_stops: usize,
) -> Result<TripTimes, ConversionError> {
    if dto.stop_times.len() != num_stops {
        return Err(ConversionError::StopCountMismatch {
            trip: dto.id.clone(),
            expected: num_stops,
            actual: dto.stop_times.len(),
        });
    }

    let mut trip = Trip::new(parse_id(&dto.id)?, Arc::clone(route), parse_id(&dto.service_id)?);
    trip.direction = dto.direction;
    trip.short_name = dto.short_name.clone();

    let stop_times = dto
        .stop_times
        .iter()
        .enumerate()
        .map(|(i, st)| {
            Ok(ScheduledStopTime {
                arrival: parse_time(&st.arrival)?,
                departure: parse_time(&st.departure)?,
                stop_sequence: st.stop_sequence.unwrap_or(i as u32),
            })
        })
        .collect::<Result<Vec<_>, ConversionError>>()?;

    TripTimes::new_scheduled(Arc::new(trip), stop_times).map_err(|source| {
        ConversionError::InvalidTimes {
            trip: dto.id.clone(),
            source,
        }
    })
}

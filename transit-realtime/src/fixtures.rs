//! A small network shared by unit tests.
//!
//! ```text
//! Route1 (operator Operator1, rail)
//!   T1: A1 0:00:10/0:00:11 -> B1 0:00:20/0:00:21
//!   T3: A1 0:30:10/0:30:11 -> B1 0:30:20/0:30:21
//!   T2: A1 1:00/1:01 -> B1 1:10/1:11 -> C1 1:20/1:21
//! ```
//!
//! T1 and T3 share a pattern. B1 and B2 are quays of station B. All trips
//! run on [`date`] and the day after. The time zone is UTC so instants read as service times.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Agency, FeedScopedId, Operator, Route, ScheduledStopTime, ServiceTime, Stop, StopPattern,
    Timetable, TransitMode, Trip, TripOnServiceDate, TripPattern, TripTimes,
};
use crate::schedule::TransitModel;

pub const FEED: &str = "RB";

pub fn id(s: &str) -> FeedScopedId {
    FeedScopedId::new(FEED, s)
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

pub fn t(s: &str) -> ServiceTime {
    ServiceTime::parse(s).unwrap()
}

/// An instant on [`date`], given as `H:MM:SS`.
pub fn at(s: &str) -> DateTime<Utc> {
    format!("2024-03-15T{:0>8}Z", s).parse().unwrap()
}

pub fn stop(name: &str, station: &str) -> Arc<Stop> {
    Arc::new(Stop {
        id: id(name),
        name: name.to_string(),
        parent_station: Some(id(station)),
    })
}

pub fn route() -> Arc<Route> {
    Arc::new(Route {
        id: id("Route1"),
        agency: Arc::new(Agency {
            id: id("Agency1"),
            name: "Agency".to_string(),
        }),
        operator: Some(Arc::new(Operator {
            id: id("Operator1"),
            name: "Operator".to_string(),
        })),
        short_name: Some("L1".to_string()),
        mode: TransitMode::Rail,
        sub_mode: None,
        created_by_realtime: false,
    })
}

pub fn trip_times(route: &Arc<Route>, trip: &str, times: &[(&str, &str)]) -> TripTimes {
    let trip = Trip::new(id(trip), Arc::clone(route), id("CAL1"));
    let stop_times = times
        .iter()
        .enumerate()
        .map(|(i, (arr, dep))| ScheduledStopTime {
            arrival: t(arr),
            departure: t(dep),
            stop_sequence: i as u32,
        })
        .collect();
    TripTimes::new_scheduled(Arc::new(trip), stop_times).unwrap()
}

fn pattern(
    route: &Arc<Route>,
    pattern_id: &str,
    stops: &[&Arc<Stop>],
    trips: Vec<TripTimes>,
) -> TripPattern {
    TripPattern::new(
        id(pattern_id),
        Arc::clone(route),
        StopPattern::scheduled(stops.iter().map(|s| Arc::clone(s))),
        Timetable::from_trip_times(id(pattern_id), None, trips),
    )
}

pub fn model() -> TransitModel {
    let route = route();
    let a1 = stop("A1", "A");
    let b1 = stop("B1", "B");
    let b2 = stop("B2", "B");
    let c1 = stop("C1", "C");
    let d1 = stop("D1", "D");

    let t1 = trip_times(&route, "T1", &[("0:00:10", "0:00:11"), ("0:00:20", "0:00:21")]);
    let t3 = trip_times(&route, "T3", &[("0:30:10", "0:30:11"), ("0:30:20", "0:30:21")]);
    let t2 = trip_times(
        &route,
        "T2",
        &[("1:00", "1:01"), ("1:10", "1:11"), ("1:20", "1:21")],
    );
    let t1_trip = Arc::clone(t1.trip());
    let pattern1 = pattern(&route, "Pattern1", &[&a1, &b1], vec![t1, t3]);
    let pattern2 = pattern(&route, "Pattern2", &[&a1, &b1, &c1], vec![t2]);

    let mut builder = TransitModel::builder(chrono_tz::UTC)
        .agency(Agency::clone(&route.agency))
        .route(Arc::clone(&route))
        .pattern(pattern1)
        .pattern(pattern2)
        .service_date(id("CAL1"), date())
        .service_date(id("CAL1"), date().succ_opt().unwrap())
        .trip_on_service_date(TripOnServiceDate {
            id: id("DSJ-T1"),
            trip: t1_trip,
            service_date: date(),
            replacement_for: Vec::new(),
        });
    if let Some(operator) = &route.operator {
        builder = builder.operator(Operator::clone(operator));
    }
    for stop in [a1, b1, b2, c1, d1] {
        builder = builder.stop(stop);
    }
    builder.build()
}

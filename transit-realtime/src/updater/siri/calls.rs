//! Per-call rules shared by modified and added journeys.

use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;

use super::types::{ArrivalBoardingActivity, Call, CallStatus, DepartureBoardingActivity};
use crate::domain::{PatternStop, PickDrop, RealTimeTripTimesBuilder, ServiceTime};
use crate::updater::result::UpdateErrorType;

/// A call time that could not be placed on the service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct InvalidCallTime {
    pub error_type: UpdateErrorType,
    pub stop_index: usize,
}

fn to_service_time(
    time: DateTime<FixedOffset>,
    service_date: NaiveDate,
    zone: Tz,
    error_type: UpdateErrorType,
    stop_index: usize,
) -> Result<ServiceTime, InvalidCallTime> {
    ServiceTime::from_instant(&time, service_date, zone).ok_or(InvalidCallTime {
        error_type,
        stop_index,
    })
}

/// Aimed arrival and departure, each falling back to the other.
///
/// The first stop uses its departure for both and the last stop its
/// arrival, so planned dwell at the ends is never negative.
pub(super) fn aimed_times(
    call: &Call,
    stop_index: usize,
    stop_count: usize,
    service_date: NaiveDate,
    zone: Tz,
) -> Result<(ServiceTime, ServiceTime), InvalidCallTime> {
    let arrival = call.aimed_arrival_time.or(call.aimed_departure_time);
    let departure = call.aimed_departure_time.or(call.aimed_arrival_time);
    let (Some(arrival), Some(departure)) = (arrival, departure) else {
        return Err(InvalidCallTime {
            error_type: UpdateErrorType::InvalidArrivalTime,
            stop_index,
        });
    };
    let arrival = to_service_time(
        arrival,
        service_date,
        zone,
        UpdateErrorType::InvalidArrivalTime,
        stop_index,
    )?;
    let departure = to_service_time(
        departure,
        service_date,
        zone,
        UpdateErrorType::InvalidDepartureTime,
        stop_index,
    )?;
    let arrival = if stop_index == 0 { departure } else { arrival };
    let departure = if stop_index + 1 == stop_count {
        arrival
    } else {
        departure
    };
    Ok((arrival, departure))
}

/// Write the call's real-time times and flags into the builder.
///
/// Recorded calls prefer actual over expected over aimed times, estimated
/// calls expected over aimed. A missing arrival takes the departure and
/// vice versa; with neither, the planned times stay.
pub(super) fn apply_call_times(
    builder: &mut RealTimeTripTimesBuilder,
    stop_index: usize,
    call: &Call,
    recorded: bool,
    journey_prediction_inaccurate: bool,
    service_date: NaiveDate,
    zone: Tz,
) -> Result<(), InvalidCallTime> {
    let pick = |actual: Option<DateTime<FixedOffset>>,
                expected: Option<DateTime<FixedOffset>>,
                aimed: Option<DateTime<FixedOffset>>| {
        if recorded {
            actual.or(expected).or(aimed)
        } else {
            expected.or(aimed)
        }
    };
    let arrival = pick(
        call.actual_arrival_time,
        call.expected_arrival_time,
        call.aimed_arrival_time,
    );
    let departure = pick(
        call.actual_departure_time,
        call.expected_departure_time,
        call.aimed_departure_time,
    );

    if let Some(arrival) = arrival.or(departure) {
        let time = to_service_time(
            arrival,
            service_date,
            zone,
            UpdateErrorType::InvalidArrivalTime,
            stop_index,
        )?;
        builder.set_arrival(stop_index, time);
    }
    if let Some(departure) = departure.or(arrival) {
        let time = to_service_time(
            departure,
            service_date,
            zone,
            UpdateErrorType::InvalidDepartureTime,
            stop_index,
        )?;
        builder.set_departure(stop_index, time);
    }

    if recorded && (call.actual_arrival_time.is_some() || call.actual_departure_time.is_some()) {
        builder.set_recorded(stop_index);
    }
    if journey_prediction_inaccurate || call.prediction_inaccurate {
        builder.set_inaccurate_prediction(stop_index);
    }
    Ok(())
}

/// Apply cancellations and boarding activities to a pattern stop.
pub(super) fn apply_call_rules(mut stop: PatternStop, call: &Call) -> PatternStop {
    if call.cancellation || call.departure_status == Some(CallStatus::Cancelled) {
        stop.pickup = PickDrop::Cancelled;
    } else {
        match call.departure_boarding_activity {
            Some(DepartureBoardingActivity::Boarding) => stop.pickup = PickDrop::Scheduled,
            Some(DepartureBoardingActivity::NoBoarding | DepartureBoardingActivity::PassThru) => {
                stop.pickup = PickDrop::None
            }
            None => {}
        }
    }

    if call.cancellation || call.arrival_status == Some(CallStatus::Cancelled) {
        stop.dropoff = PickDrop::Cancelled;
    } else {
        match call.arrival_boarding_activity {
            Some(ArrivalBoardingActivity::Alighting) => stop.dropoff = PickDrop::Scheduled,
            Some(ArrivalBoardingActivity::NoAlighting | ArrivalBoardingActivity::PassThru) => {
                stop.dropoff = PickDrop::None
            }
            None => {}
        }
    }
    stop
}

/// Returns true if the call leaves the stop fully cancelled.
pub(super) fn is_cancelled_stop(stop: &PatternStop) -> bool {
    stop.pickup == PickDrop::Cancelled && stop.dropoff == PickDrop::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, at, date, id, t};

    fn builder() -> RealTimeTripTimesBuilder {
        let model = fixtures::model();
        let pattern = model.pattern(&id("Pattern1")).unwrap();
        pattern
            .scheduled_timetable()
            .trip_times_for(&id("T1"))
            .unwrap()
            .builder()
    }

    fn time(s: &str) -> Option<DateTime<FixedOffset>> {
        Some(at(s).fixed_offset())
    }

    #[test]
    fn recorded_call_prefers_actual_times() {
        let mut b = builder();
        let call = Call {
            stop_point_ref: "A1".into(),
            aimed_departure_time: time("0:00:11"),
            expected_departure_time: time("0:00:13"),
            actual_departure_time: time("0:00:15"),
            ..Default::default()
        };
        apply_call_times(&mut b, 0, &call, true, false, date(), chrono_tz::UTC).unwrap();
        assert_eq!(b.departure(0), t("0:00:15"));
        // Arrival borrows the departure
        assert_eq!(b.arrival(0), t("0:00:15"));
        let built = b.build(crate::domain::RealTimeChange::Updated).unwrap();
        assert!(built.flags(0).recorded);
    }

    #[test]
    fn estimated_call_ignores_actual_times() {
        let mut b = builder();
        let call = Call {
            stop_point_ref: "B1".into(),
            aimed_arrival_time: time("0:00:20"),
            expected_arrival_time: time("0:00:25"),
            actual_arrival_time: time("0:00:30"),
            prediction_inaccurate: true,
            ..Default::default()
        };
        apply_call_times(&mut b, 1, &call, false, false, date(), chrono_tz::UTC).unwrap();
        assert_eq!(b.arrival(1), t("0:00:25"));
        assert_eq!(b.departure(1), t("0:00:25"));
        let built = b.build(crate::domain::RealTimeChange::Updated).unwrap();
        assert!(!built.flags(1).recorded);
        assert!(built.flags(1).inaccurate_prediction);
    }

    #[test]
    fn call_without_times_keeps_schedule() {
        let mut b = builder();
        let call = Call {
            stop_point_ref: "A1".into(),
            ..Default::default()
        };
        apply_call_times(&mut b, 0, &call, false, false, date(), chrono_tz::UTC).unwrap();
        assert_eq!(b.arrival(0), t("0:00:10"));
        assert_eq!(b.departure(0), t("0:00:11"));
    }

    #[test]
    fn aimed_times_at_trip_ends() {
        let call = Call {
            stop_point_ref: "C1".into(),
            aimed_arrival_time: time("0:01:00"),
            aimed_departure_time: time("0:02:00"),
            ..Default::default()
        };
        let zone = chrono_tz::UTC;
        assert_eq!(
            aimed_times(&call, 0, 2, date(), zone).unwrap(),
            (t("0:02"), t("0:02"))
        );
        assert_eq!(
            aimed_times(&call, 1, 2, date(), zone).unwrap(),
            (t("0:01"), t("0:01"))
        );
        assert_eq!(
            aimed_times(&call, 1, 3, date(), zone).unwrap(),
            (t("0:01"), t("0:02"))
        );

        let missing = Call::default();
        assert_eq!(
            aimed_times(&missing, 1, 3, date(), zone).unwrap_err(),
            InvalidCallTime {
                error_type: UpdateErrorType::InvalidArrivalTime,
                stop_index: 1
            }
        );
    }

    #[test]
    fn call_rules() {
        let model = fixtures::model();
        let stop = PatternStop::new(model.stop(&id("B1")).unwrap().clone());

        let cancelled = apply_call_rules(
            stop.clone(),
            &Call {
                cancellation: true,
                departure_boarding_activity: Some(DepartureBoardingActivity::Boarding),
                ..Default::default()
            },
        );
        assert!(is_cancelled_stop(&cancelled));

        let no_boarding = apply_call_rules(
            stop.clone(),
            &Call {
                departure_boarding_activity: Some(DepartureBoardingActivity::NoBoarding),
                arrival_status: Some(CallStatus::Cancelled),
                ..Default::default()
            },
        );
        assert_eq!(no_boarding.pickup, PickDrop::None);
        assert_eq!(no_boarding.dropoff, PickDrop::Cancelled);
        assert!(!no_boarding.is_routable());
        assert!(!is_cancelled_stop(&no_boarding));

        let unchanged = apply_call_rules(stop, &Call::default());
        assert_eq!(unchanged.pickup, PickDrop::Scheduled);
        assert_eq!(unchanged.dropoff, PickDrop::Scheduled);
    }
}

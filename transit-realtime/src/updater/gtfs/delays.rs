//! Applying stop time updates to a planned trip, with delay propagation.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;

use super::types::{StopScheduleRelationship, StopTimeEvent, StopTimeUpdate};
use crate::config::BackwardsDelayPropagation;
use crate::domain::{RealTimeTripTimesBuilder, ServiceTime, Stop, StopPattern};
use crate::updater::UpdateErrorType;

/// A stop time update that cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct InvalidStopTimeUpdate {
    pub error_type: UpdateErrorType,
    pub stop_index: Option<usize>,
}

impl InvalidStopTimeUpdate {
    fn at(error_type: UpdateErrorType, stop_index: usize) -> Self {
        Self {
            error_type,
            stop_index: Some(stop_index),
        }
    }
}

/// Write `updates` into `builder`, which holds the planned times of a trip
/// running on `stops`.
///
/// Updates must follow the trip's stop order. Each matches a stop by stop
/// sequence, or by stop id when it has no sequence. Stops after an update
/// inherit its departure delay until the next update; stops before the
/// first timed update follow `backwards`. Skipped stops are interpolated
/// between their served neighbours.
///
/// Returns the indexes of skipped stops.
pub(super) fn apply_stop_time_updates(
    builder: &mut RealTimeTripTimesBuilder,
    stops: &StopPattern,
    updates: &[StopTimeUpdate],
    service_date: NaiveDate,
    zone: Tz,
    backwards: BackwardsDelayPropagation,
) -> Result<Vec<usize>, InvalidStopTimeUpdate> {
    let mut pending = updates.iter().peekable();
    let mut relationships = vec![None; builder.num_stops()];
    let mut delay: Option<i32> = None;
    let mut first_timed = None;
    let mut skipped = Vec::new();

    for i in 0..builder.num_stops() {
        let sequence = builder.stop_sequence(i);
        let Some(update) = pending.next_if(|u| matches_stop(u, sequence, stops.stop(i))) else {
            if let Some(delay) = delay {
                shift(builder, i, delay)?;
            }
            continue;
        };
        relationships[i] = Some(update.schedule_relationship);

        match update.schedule_relationship {
            StopScheduleRelationship::Skipped => {
                builder.cancel_stop(i);
                skipped.push(i);
                if let Some(delay) = delay {
                    shift(builder, i, delay)?;
                }
            }
            StopScheduleRelationship::NoData => {
                builder.set_no_data(i);
                delay = None;
            }
            StopScheduleRelationship::Scheduled => {
                let (planned_arrival, planned_departure) =
                    (builder.scheduled_arrival(i), builder.scheduled_departure(i));
                let invalid_arrival = InvalidStopTimeUpdate::at(UpdateErrorType::InvalidArrivalTime, i);
                let invalid_departure =
                    InvalidStopTimeUpdate::at(UpdateErrorType::InvalidDepartureTime, i);
                let arrival = event_time(update.arrival.as_ref(), planned_arrival, service_date, zone)
                    .ok_or(invalid_arrival)?;
                let departure =
                    event_time(update.departure.as_ref(), planned_departure, service_date, zone)
                        .ok_or(invalid_departure)?;

                let arrival = match arrival {
                    Some(arrival) => arrival,
                    None => {
                        let inherited = match (delay, departure) {
                            (Some(delay), _) => delay,
                            (None, Some(d)) => {
                                d.checked_sub(planned_departure).ok_or(invalid_arrival)?
                            }
                            (None, None) => 0,
                        };
                        let derived = planned_arrival
                            .checked_add(inherited)
                            .ok_or(invalid_arrival)?;
                        departure.map_or(derived, |d| derived.min(d))
                    }
                };
                let departure = match departure {
                    Some(departure) => departure,
                    None => arrival
                        .checked_sub(planned_arrival)
                        .and_then(|delay| planned_departure.checked_add(delay))
                        .ok_or(invalid_departure)?
                        .max(arrival),
                };
                builder.set_arrival(i, arrival);
                builder.set_departure(i, departure);
                delay = Some(
                    departure
                        .checked_sub(planned_departure)
                        .ok_or(invalid_departure)?,
                );
                first_timed.get_or_insert(i);
            }
        }
    }

    if pending.next().is_some() {
        return Err(InvalidStopTimeUpdate {
            error_type: UpdateErrorType::InvalidStopSequence,
            stop_index: None,
        });
    }

    if let Some(first) = first_timed {
        propagate_backwards(builder, first, &relationships, backwards)?;
    }
    builder.interpolate_cancelled_stops();
    Ok(skipped)
}

fn matches_stop(update: &StopTimeUpdate, sequence: u32, stop: Option<&Arc<Stop>>) -> bool {
    match (update.stop_sequence, &update.stop_id) {
        (Some(wanted), _) => wanted == i64::from(sequence),
        (None, Some(stop_id)) => stop.is_some_and(|s| s.id.id() == stop_id),
        (None, None) => false,
    }
}

/// The time an event gives for a stop: `Some(None)` without an event,
/// `None` when the event has no usable time.
fn event_time(
    event: Option<&StopTimeEvent>,
    planned: ServiceTime,
    service_date: NaiveDate,
    zone: Tz,
) -> Option<Option<ServiceTime>> {
    let Some(event) = event else {
        return Some(None);
    };
    let time = match (event.time, event.delay) {
        (Some(time), _) => ServiceTime::from_epoch_seconds(time, service_date, zone)?,
        (None, Some(delay)) => planned.checked_add(delay)?,
        (None, None) => return None,
    };
    Some(Some(time))
}

/// Move a stop's planned times by `delay`.
fn shift(
    builder: &mut RealTimeTripTimesBuilder,
    stop: usize,
    delay: i32,
) -> Result<(), InvalidStopTimeUpdate> {
    let arrival = builder
        .scheduled_arrival(stop)
        .checked_add(delay)
        .ok_or(InvalidStopTimeUpdate::at(UpdateErrorType::InvalidArrivalTime, stop))?;
    let departure = builder
        .scheduled_departure(stop)
        .checked_add(delay)
        .ok_or(InvalidStopTimeUpdate::at(UpdateErrorType::InvalidDepartureTime, stop))?;
    builder.set_arrival(stop, arrival);
    builder.set_departure(stop, departure);
    Ok(())
}

/// Fill in stops before the first timed update.
fn propagate_backwards(
    builder: &mut RealTimeTripTimesBuilder,
    first: usize,
    relationships: &[Option<StopScheduleRelationship>],
    mode: BackwardsDelayPropagation,
) -> Result<(), InvalidStopTimeUpdate> {
    match mode {
        BackwardsDelayPropagation::Always => {
            let delay = builder
                .arrival(first)
                .checked_sub(builder.scheduled_arrival(first))
                .ok_or(InvalidStopTimeUpdate::at(UpdateErrorType::InvalidArrivalTime, first))?;
            for i in 0..first {
                if relationships[i] != Some(StopScheduleRelationship::NoData) {
                    shift(builder, i, delay)?;
                }
            }
        }
        BackwardsDelayPropagation::Required | BackwardsDelayPropagation::RequiredNoData => {
            for i in (0..first).rev() {
                let next_arrival = builder.arrival(i + 1);
                if builder.departure(i) > next_arrival {
                    builder.set_departure(i, next_arrival);
                }
                if builder.arrival(i) > builder.departure(i) {
                    let departure = builder.departure(i);
                    builder.set_arrival(i, departure);
                }
                if mode == BackwardsDelayPropagation::RequiredNoData && relationships[i].is_none() {
                    builder.set_no_data(i);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RealTimeChange, TripPattern, TripTimes};
    use crate::fixtures::{self, at, date, id, t};

    fn t2() -> (Arc<TripPattern>, RealTimeTripTimesBuilder) {
        let model = fixtures::model();
        let pattern = Arc::clone(model.pattern(&id("Pattern2")).unwrap());
        let builder = pattern
            .scheduled_timetable()
            .trip_times_for(&id("T2"))
            .unwrap()
            .builder();
        (pattern, builder)
    }

    fn delay(seconds: i32) -> Option<StopTimeEvent> {
        Some(StopTimeEvent {
            delay: Some(seconds),
            ..Default::default()
        })
    }

    fn at_sequence(sequence: i64) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_sequence: Some(sequence),
            ..Default::default()
        }
    }

    fn apply(
        updates: &[StopTimeUpdate],
        backwards: BackwardsDelayPropagation,
    ) -> Result<(TripTimes, Vec<usize>), InvalidStopTimeUpdate> {
        let (pattern, mut builder) = t2();
        let skipped = apply_stop_time_updates(
            &mut builder,
            pattern.stop_pattern(),
            updates,
            date(),
            chrono_tz::UTC,
            backwards,
        )?;
        Ok((builder.build(RealTimeChange::Updated).unwrap(), skipped))
    }

    fn times(row: &TripTimes) -> Vec<(ServiceTime, ServiceTime)> {
        (0..row.num_stops())
            .map(|i| (row.arrival(i), row.departure(i)))
            .collect()
    }

    #[test]
    fn delay_propagates_forwards() {
        let update = StopTimeUpdate {
            arrival: delay(60),
            ..at_sequence(1)
        };
        let (row, skipped) = apply(&[update], BackwardsDelayPropagation::Required).unwrap();

        assert!(skipped.is_empty());
        assert_eq!(
            times(&row),
            [
                (t("1:00"), t("1:01")),
                (t("1:11"), t("1:12")),
                (t("1:21"), t("1:22")),
            ]
        );
        assert!(!row.flags(0).no_data);
    }

    #[test]
    fn required_no_data_flags_earlier_stops() {
        let update = StopTimeUpdate {
            arrival: delay(60),
            ..at_sequence(1)
        };
        let (row, _) = apply(&[update], BackwardsDelayPropagation::RequiredNoData).unwrap();

        assert!(row.flags(0).no_data);
        assert!(!row.flags(1).no_data);
        assert_eq!(row.departure(0), t("1:01"));
    }

    #[test]
    fn always_shifts_earlier_stops() {
        let update = StopTimeUpdate {
            arrival: delay(60),
            ..at_sequence(1)
        };
        let (row, _) = apply(&[update], BackwardsDelayPropagation::Always).unwrap();

        assert_eq!(times(&row)[0], (t("1:01"), t("1:02")));
    }

    #[test]
    fn required_only_shifts_what_is_needed() {
        // B1 ten minutes early, before A1's planned departure
        let update = StopTimeUpdate {
            arrival: delay(-600),
            ..at_sequence(1)
        };
        let (row, _) = apply(&[update], BackwardsDelayPropagation::Required).unwrap();

        assert_eq!(
            times(&row),
            [
                (t("1:00"), t("1:00")),
                (t("1:00"), t("1:01")),
                (t("1:10"), t("1:11")),
            ]
        );
    }

    #[test]
    fn absolute_times_and_stop_ids() {
        let update = StopTimeUpdate {
            stop_id: Some("C1".into()),
            arrival: Some(StopTimeEvent {
                time: Some(at("1:25:00").timestamp()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (row, _) = apply(&[update], BackwardsDelayPropagation::Required).unwrap();

        assert_eq!(row.arrival(2), t("1:25"));
        assert_eq!(row.departure(2), t("1:26"));
        assert_eq!(row.departure(1), t("1:11"));
    }

    #[test]
    fn no_data_resets_the_delay() {
        let updates = [
            StopTimeUpdate {
                departure: delay(120),
                ..at_sequence(0)
            },
            StopTimeUpdate {
                schedule_relationship: StopScheduleRelationship::NoData,
                ..at_sequence(1)
            },
        ];
        let (row, _) = apply(&updates, BackwardsDelayPropagation::Required).unwrap();

        assert_eq!(
            times(&row),
            [
                (t("1:02"), t("1:03")),
                (t("1:10"), t("1:11")),
                (t("1:20"), t("1:21")),
            ]
        );
        assert!(row.flags(1).no_data);
    }

    #[test]
    fn skipped_stop_is_cancelled_and_interpolated() {
        let updates = [
            StopTimeUpdate {
                departure: delay(0),
                ..at_sequence(0)
            },
            StopTimeUpdate {
                schedule_relationship: StopScheduleRelationship::Skipped,
                ..at_sequence(1)
            },
            StopTimeUpdate {
                arrival: delay(0),
                ..at_sequence(2)
            },
        ];
        let (row, skipped) = apply(&updates, BackwardsDelayPropagation::Required).unwrap();

        assert_eq!(skipped, [1]);
        assert!(row.flags(1).cancelled);
        assert!(row.arrival(1) >= row.departure(0));
        assert!(row.departure(1) <= row.arrival(2));
    }

    #[test]
    fn rejects_unmatched_updates() {
        let unknown = [StopTimeUpdate {
            arrival: delay(0),
            ..at_sequence(7)
        }];
        let out_of_order = [
            StopTimeUpdate {
                arrival: delay(0),
                ..at_sequence(2)
            },
            StopTimeUpdate {
                arrival: delay(0),
                ..at_sequence(1)
            },
        ];
        for updates in [&unknown[..], &out_of_order[..]] {
            let err = apply(updates, BackwardsDelayPropagation::Required).unwrap_err();
            assert_eq!(err.error_type, UpdateErrorType::InvalidStopSequence);
        }
    }

    #[test]
    fn rejects_empty_events() {
        let update = StopTimeUpdate {
            arrival: delay(30),
            departure: Some(StopTimeEvent::default()),
            ..at_sequence(2)
        };
        let err = apply(&[update], BackwardsDelayPropagation::Required).unwrap_err();
        assert_eq!(
            err,
            InvalidStopTimeUpdate::at(UpdateErrorType::InvalidDepartureTime, 2)
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn first_stop_delay_shifts_the_whole_trip(seconds in -60i32..3600) {
                let update = StopTimeUpdate {
                    departure: delay(seconds),
                    ..at_sequence(0)
                };
                let (row, _) = apply(&[update], BackwardsDelayPropagation::Required).unwrap();
                for i in 1..row.num_stops() {
                    prop_assert_eq!(row.arrival(i) - row.scheduled_arrival(i), seconds);
                    prop_assert_eq!(row.departure(i) - row.scheduled_departure(i), seconds);
                }
            }
        }
    }
}

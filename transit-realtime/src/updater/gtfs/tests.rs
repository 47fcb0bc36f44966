//! End-to-end tests of the GTFS-RT adapter against the fixture network.

use std::sync::Arc;

use chrono::NaiveDate;

use super::*;
use crate::domain::{TransitMode, TripAlteration};
use crate::fixtures::{self, at, date, id};
use crate::updater::UpdateWarning;

fn tomorrow() -> NaiveDate {
    date().succ_opt().unwrap()
}

struct Harness {
    model: Arc<TransitModel>,
    adapter: GtfsRealtimeTripUpdateAdapter,
    buffer: TimetableSnapshotBuffer,
    cache: TripPatternCache,
}

impl Harness {
    fn new() -> Self {
        let model = Arc::new(fixtures::model());
        let adapter =
            GtfsRealtimeTripUpdateAdapter::new(Arc::clone(&model), &EngineConfig::default());
        Self {
            model,
            adapter,
            buffer: TimetableSnapshotBuffer::new(),
            cache: TripPatternCache::new(),
        }
    }

    fn apply(&mut self, updates: &[TripUpdate]) -> UpdateResult {
        self.apply_with(Incrementality::Differential, updates, date())
    }

    fn apply_with(
        &mut self,
        incrementality: Incrementality,
        updates: &[TripUpdate],
        today: NaiveDate,
    ) -> UpdateResult {
        self.adapter
            .apply_trip_updates(
                &mut self.buffer,
                &mut self.cache,
                incrementality,
                updates,
                today,
            )
            .unwrap()
    }

    /// The staged row of `trip` in `pattern` on `day`, rendered.
    fn describe(&self, pattern: &Arc<TripPattern>, trip: &str, day: NaiveDate) -> String {
        self.buffer
            .resolve(pattern, day)
            .trip_times_for(&id(trip))
            .unwrap()
            .describe(pattern.stop_pattern())
    }

    fn planned(&self, pattern: &str) -> Arc<TripPattern> {
        Arc::clone(self.model.pattern(&id(pattern)).unwrap())
    }
}

fn trip_update(
    trip: &str,
    relationship: TripScheduleRelationship,
    stop_time_updates: Vec<StopTimeUpdate>,
) -> TripUpdate {
    TripUpdate {
        id: format!("entity-{trip}"),
        trip: TripDescriptor {
            trip_id: Some(trip.to_string()),
            start_date: Some("20240315".to_string()),
            schedule_relationship: relationship,
            ..Default::default()
        },
        stop_time_updates,
        ..Default::default()
    }
}

fn arrival_delay(stop_sequence: i64, seconds: i32) -> StopTimeUpdate {
    StopTimeUpdate {
        stop_sequence: Some(stop_sequence),
        arrival: Some(StopTimeEvent {
            delay: Some(seconds),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A stop reached at `time` on [`date`], for trips given in full.
fn stop_at(stop: &str, time: &str) -> StopTimeUpdate {
    StopTimeUpdate {
        stop_id: Some(stop.to_string()),
        arrival: Some(StopTimeEvent {
            time: Some(at(time).timestamp()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn added_trip() -> TripUpdate {
    let mut update = trip_update(
        "added1",
        TripScheduleRelationship::Added,
        vec![stop_at("C1", "0:30:00"), stop_at("D1", "0:40:00")],
    );
    update.trip.route_id = Some("Route1".to_string());
    update
}

fn single_error(result: &UpdateResult) -> &UpdateError {
    assert_eq!(result.successful(), 0, "{result}");
    assert_eq!(result.failed(), 1, "{result}");
    &result.errors()[0]
}

#[test]
fn delay_propagates_along_planned_trip() {
    let mut h = Harness::new();
    let update = trip_update(
        "T2",
        TripScheduleRelationship::Scheduled,
        vec![arrival_delay(1, 60)],
    );

    let result = h.apply(&[update]);

    assert_eq!(result.successful(), 1, "{result}");
    let pattern = h.planned("Pattern2");
    assert_eq!(
        h.describe(&pattern, "T2", date()),
        "UPDATED | A1 [ND] 1:00 1:01 | B1 1:11 1:12 | C1 1:21 1:22"
    );
    assert!(h.buffer.new_pattern_for_modified_trip(&id("T2"), date()).is_none());
}

#[test]
fn start_date_defaults_to_today() {
    let mut h = Harness::new();
    let mut update = trip_update(
        "T2",
        TripScheduleRelationship::Scheduled,
        vec![arrival_delay(0, 120)],
    );
    update.trip.start_date = None;

    let result = h.apply_with(Incrementality::Differential, &[update], tomorrow());

    assert_eq!(result.successful(), 1, "{result}");
    let pattern = h.planned("Pattern2");
    assert!(h.describe(&pattern, "T2", tomorrow()).starts_with("UPDATED | A1 1:02 1:03"));
    assert!(h.describe(&pattern, "T2", date()).starts_with("SCHEDULED"));
}

#[test]
fn scheduled_trip_failures() {
    let mut h = Harness::new();
    let mut off_calendar = trip_update(
        "T2",
        TripScheduleRelationship::Scheduled,
        vec![arrival_delay(1, 60)],
    );
    off_calendar.trip.start_date = Some("20240320".to_string());
    let mut malformed_date = off_calendar.clone();
    malformed_date.trip.start_date = Some("2024-03-15".to_string());
    let mut no_trip_id = off_calendar.clone();
    no_trip_id.trip.trip_id = None;
    let mut empty_event = trip_update("T2", TripScheduleRelationship::Scheduled, vec![]);
    empty_event.stop_time_updates = vec![StopTimeUpdate {
        stop_sequence: Some(2),
        arrival: Some(StopTimeEvent::default()),
        ..Default::default()
    }];

    let result = h.apply(&[
        off_calendar,
        malformed_date,
        no_trip_id,
        trip_update("T2", TripScheduleRelationship::Scheduled, vec![]),
        trip_update(
            "T9",
            TripScheduleRelationship::Scheduled,
            vec![arrival_delay(0, 1)],
        ),
        trip_update(
            "T2",
            TripScheduleRelationship::Scheduled,
            vec![arrival_delay(7, 60)],
        ),
        empty_event,
    ]);

    assert_eq!(result.successful(), 0, "{result}");
    assert_eq!(
        result.error_types(),
        [
            UpdateErrorType::NoServiceOnDate,
            UpdateErrorType::NoStartDate,
            UpdateErrorType::TripNotFound,
            UpdateErrorType::NoUpdates,
            UpdateErrorType::TripNotFound,
            UpdateErrorType::InvalidStopSequence,
            UpdateErrorType::InvalidArrivalTime,
        ]
    );
    assert_eq!(result.errors()[2].trip_id, None);
    assert_eq!(result.errors()[6].stop_index, Some(2));
    assert_eq!(h.buffer.timetable_count(), 0);
}

#[test]
fn oversized_delay_rejects_only_its_trip() {
    let mut h = Harness::new();

    let result = h.apply(&[
        trip_update(
            "T2",
            TripScheduleRelationship::Scheduled,
            vec![arrival_delay(1, i32::MAX)],
        ),
        trip_update("T1", TripScheduleRelationship::Canceled, vec![]),
    ]);

    assert_eq!(result.successful(), 1, "{result}");
    assert_eq!(result.failed(), 1, "{result}");
    assert_eq!(result.error_types(), [UpdateErrorType::InvalidArrivalTime]);
    assert_eq!(result.errors()[0].stop_index, Some(1));
    assert!(h.describe(&h.planned("Pattern2"), "T2", date()).starts_with("SCHEDULED"));
    assert_eq!(h.buffer.list_canceled_trips().len(), 1);
}

#[test]
fn oversized_delay_on_added_trip() {
    let mut h = Harness::new();
    let mut update = added_trip();
    update.stop_time_updates[0].arrival = Some(StopTimeEvent {
        scheduled_time: Some(at("0:30:00").timestamp()),
        delay: Some(i32::MAX),
        ..Default::default()
    });

    let result = h.apply(&[
        update,
        trip_update("T1", TripScheduleRelationship::Canceled, vec![]),
    ]);

    assert_eq!(result.successful(), 1, "{result}");
    assert_eq!(result.error_types(), [UpdateErrorType::InvalidArrivalTime]);
    assert_eq!(result.errors()[0].stop_index, Some(0));
    assert!(h.buffer.added_trip(&id("added1")).is_none());
}

#[test]
fn skipped_stop_moves_trip_to_modified_pattern() {
    let mut h = Harness::new();
    let skipped = StopTimeUpdate {
        stop_sequence: Some(1),
        schedule_relationship: StopScheduleRelationship::Skipped,
        ..Default::default()
    };

    let result = h.apply(&[trip_update(
        "T2",
        TripScheduleRelationship::Scheduled,
        vec![skipped],
    )]);

    assert_eq!(result.successful(), 1, "{result}");
    let planned = h.planned("Pattern2");
    assert!(h.describe(&planned, "T2", date()).starts_with("CANCELED"));
    let modified = Arc::clone(
        h.buffer
            .new_pattern_for_modified_trip(&id("T2"), date())
            .unwrap(),
    );
    assert_eq!(modified.id(), &id("Route1:RT0"));
    assert_eq!(modified.original_pattern(), Some(&id("Pattern2")));
    assert_eq!(modified.stop_pattern().stops()[1].pickup, PickDrop::Cancelled);
    assert_eq!(
        h.describe(&modified, "T2", date()),
        "MODIFIED | A1 1:00 1:01 | B1 [C] 1:10 1:11 | C1 1:20 1:21"
    );

    // A later update without skips moves the trip back
    let result = h.apply(&[trip_update(
        "T2",
        TripScheduleRelationship::Scheduled,
        vec![arrival_delay(2, 0)],
    )]);
    assert_eq!(result.successful(), 1, "{result}");
    assert!(h.buffer.new_pattern_for_modified_trip(&id("T2"), date()).is_none());
    assert!(h.describe(&planned, "T2", date()).starts_with("UPDATED"));
    assert!(
        h.buffer
            .resolve(&modified, date())
            .trip_times_for(&id("T2"))
            .is_none()
    );
}

#[test]
fn cancel_and_delete_planned_trips() {
    let mut h = Harness::new();

    let result = h.apply(&[
        trip_update("T1", TripScheduleRelationship::Canceled, vec![]),
        trip_update("T2", TripScheduleRelationship::Deleted, vec![]),
        trip_update("T9", TripScheduleRelationship::Canceled, vec![]),
    ]);

    assert_eq!(result.successful(), 2, "{result}");
    assert_eq!(
        result.error_types(),
        [UpdateErrorType::NoTripForCancellationFound]
    );
    let canceled = h.buffer.list_canceled_trips();
    assert_eq!(canceled.len(), 1);
    assert_eq!(canceled[0].trip_times.trip_id(), &id("T1"));
    let t2 = Arc::clone(
        h.buffer
            .resolve(&h.planned("Pattern2"), date())
            .trip_times_for(&id("T2"))
            .unwrap(),
    );
    assert!(t2.is_deleted());
}

#[test]
fn add_trip() {
    let mut h = Harness::new();
    let mut update = added_trip();
    update
        .stop_time_updates
        .insert(1, stop_at("UNKNOWN", "0:35:00"));

    let result = h.apply(&[update]);

    assert_eq!(result.successful(), 1, "{result}");
    assert_eq!(
        result.warnings(),
        [UpdateWarning::UnknownStopsRemovedFromAddedTrip]
    );
    let trip = h.buffer.added_trip(&id("added1")).unwrap();
    assert_eq!(trip.alteration, TripAlteration::Extra);
    assert_eq!(trip.service_id, id("RT-20240315"));
    assert!(h.buffer.added_routes().is_empty());

    let pattern = Arc::clone(h.buffer.added_pattern_for_trip(&id("added1")).unwrap());
    assert_eq!(pattern.id(), &id("Route1:RT0"));
    assert_eq!(
        h.describe(&pattern, "added1", date()),
        "ADDED | C1 0:30 0:30 | D1 0:40 0:40"
    );
    assert!(
        h.buffer
            .added_trip_on_service_date(&id("added1"), date())
            .is_some()
    );
}

#[test]
fn re_adding_trip_replaces_its_row() {
    let mut h = Harness::new();
    h.apply(&[added_trip()]);
    let mut later = added_trip();
    later.stop_time_updates[1] = stop_at("D1", "0:45:00");

    let result = h.apply(&[later]);

    assert_eq!(result.successful(), 1, "{result}");
    assert_eq!(h.buffer.added_trips().len(), 1);
    let pattern = Arc::clone(h.buffer.added_pattern_for_trip(&id("added1")).unwrap());
    let timetable = h.buffer.resolve(&pattern, date());
    assert_eq!(timetable.len(), 1);
    assert_eq!(
        h.describe(&pattern, "added1", date()),
        "ADDED | C1 0:30 0:30 | D1 0:45 0:45"
    );
}

#[test]
fn added_trip_failures() {
    let mut h = Harness::new();
    let mut no_date = added_trip();
    no_date.trip.start_date = None;
    let mut no_stops = added_trip();
    no_stops.stop_time_updates = vec![stop_at("X", "0:30:00"), stop_at("Y", "0:40:00")];
    let mut one_stop = added_trip();
    one_stop.stop_time_updates.truncate(1);
    let mut backwards = added_trip();
    backwards.stop_time_updates[0].stop_sequence = Some(3);
    backwards.stop_time_updates[1].stop_sequence = Some(2);

    let result = h.apply(&[
        trip_update("T1", TripScheduleRelationship::Added, vec![]),
        no_date,
        no_stops,
        one_stop,
        backwards,
    ]);

    assert_eq!(
        result.error_types(),
        [
            UpdateErrorType::TripAlreadyExists,
            UpdateErrorType::NoStartDate,
            UpdateErrorType::NoValidStops,
            UpdateErrorType::TooFewStops,
            UpdateErrorType::InvalidStopSequence,
        ]
    );
    assert!(h.buffer.added_trips().is_empty());
}

#[test]
fn added_trip_creates_route() {
    let mut h = Harness::new();
    let mut update = added_trip();
    update.trip.route_id = Some("Line9".to_string());

    let result = h.apply(&[update]);

    assert_eq!(result.successful(), 1, "{result}");
    let route = h.buffer.added_route(&id("Line9")).unwrap();
    assert!(route.created_by_realtime);
    assert_eq!(route.agency.id, id("Agency1"));
    assert_eq!(route.mode, TransitMode::Bus);
    assert_eq!(
        h.buffer.added_pattern_for_trip(&id("added1")).unwrap().id(),
        &id("Line9:RT0")
    );
}

#[test]
fn cancel_added_trip() {
    let mut h = Harness::new();
    h.apply(&[added_trip()]);

    let result = h.apply(&[trip_update(
        "added1",
        TripScheduleRelationship::Canceled,
        vec![],
    )]);

    assert_eq!(result.successful(), 1, "{result}");
    let pattern = Arc::clone(h.buffer.added_pattern_for_trip(&id("added1")).unwrap());
    assert_eq!(
        h.describe(&pattern, "added1", date()),
        "CANCELED | C1 [C] 0:30 0:30 | D1 [C] 0:40 0:40"
    );
    assert!(h.buffer.added_trip(&id("added1")).is_some());
}

#[test]
fn replacement_swaps_stop_list() {
    let mut h = Harness::new();
    let mut first = stop_at("A1", "0:00:10");
    first.arrival = Some(StopTimeEvent {
        delay: Some(0),
        ..Default::default()
    });
    let update = trip_update(
        "T1",
        TripScheduleRelationship::Replacement,
        vec![first, stop_at("B2", "0:00:30"), stop_at("D1", "0:10:00")],
    );

    let result = h.apply(&[update]);

    assert_eq!(result.successful(), 1, "{result}");
    assert!(h.describe(&h.planned("Pattern1"), "T1", date()).starts_with("CANCELED"));
    let modified = Arc::clone(
        h.buffer
            .new_pattern_for_modified_trip(&id("T1"), date())
            .unwrap(),
    );
    assert_eq!(
        h.describe(&modified, "T1", date()),
        "MODIFIED | A1 0:00:10 0:00:11 | B2 0:00:30 0:00:30 | D1 0:10 0:10"
    );
    assert_eq!(h.buffer.patterns_for_stop(&id("D1")).len(), 1);
}

#[test]
fn replacement_needs_known_stops() {
    let mut h = Harness::new();

    let result = h.apply(&[trip_update(
        "T1",
        TripScheduleRelationship::Replacement,
        vec![stop_at("A1", "0:00:10"), stop_at("X", "0:00:30")],
    )]);

    let error = single_error(&result);
    assert_eq!(error.error_type, UpdateErrorType::UnknownStop);
    assert_eq!(error.stop_index, Some(1));
}

#[test]
fn unsupported_relationships() {
    let mut h = Harness::new();

    let result = h.apply(&[
        trip_update("T1", TripScheduleRelationship::Unscheduled, vec![]),
        trip_update("T1", TripScheduleRelationship::Duplicated, vec![]),
    ]);

    assert_eq!(
        result.error_types(),
        [
            UpdateErrorType::NotImplementedUnscheduled,
            UpdateErrorType::NotImplementedDuplicated,
        ]
    );
}

#[test]
fn deleted_entities_are_skipped() {
    let mut h = Harness::new();
    let update = TripUpdate {
        is_deleted: true,
        ..trip_update("T1", TripScheduleRelationship::Canceled, vec![])
    };

    let result = h.apply(&[update]);

    assert_eq!(result.successful(), 0);
    assert_eq!(result.failed(), 0);
    assert!(h.buffer.is_empty());
}

#[test]
fn full_dataset_replaces_previous_state() {
    let mut h = Harness::new();
    h.apply(&[
        added_trip(),
        trip_update("T1", TripScheduleRelationship::Canceled, vec![]),
    ]);
    assert!(!h.buffer.is_empty());

    let result = h.apply_with(Incrementality::FullDataset, &[], date());

    assert_eq!(result.successful(), 0);
    assert!(h.buffer.is_empty());
    assert!(h.cache.is_empty());
    assert!(h.describe(&h.planned("Pattern1"), "T1", date()).starts_with("SCHEDULED"));
}

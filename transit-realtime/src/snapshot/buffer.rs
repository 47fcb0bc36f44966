//! The mutable staging area for real-time updates.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use super::published::TimetableSnapshot;
use super::state::{PatternTimetables, RealTimeData, TimetableIndex, TimetableRepository};
use crate::domain::{
    FeedScopedId, Timetable, TripIdAndServiceDate, TripOnServiceDate, TripPattern, TripTimes,
};

/// A buffer mutator was called after the buffer had been committed.
///
/// This is a contract violation by the caller, not a data problem: the
/// writer kept using a buffer it had already handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("concurrent modification: {operation} called on a committed snapshot buffer")]
pub struct ConcurrentModification {
    operation: &'static str,
}

impl ConcurrentModification {
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// A complete replacement of one trip's real-time row on one date.
#[derive(Debug, Clone)]
pub struct RealTimeTripUpdate {
    pub pattern: Arc<TripPattern>,
    pub trip_times: TripTimes,
    pub service_date: NaiveDate,
    /// Dated trip to register for a trip created in real time.
    pub added_trip_on_service_date: Option<Arc<TripOnServiceDate>>,
    /// The trip does not exist in the planned schedule.
    pub trip_creation: bool,
    /// The trip's route does not exist in the planned schedule.
    pub route_creation: bool,
    pub producer: Option<String>,
}

impl RealTimeTripUpdate {
    /// Update for a trip that exists in the planned schedule.
    pub fn new(pattern: Arc<TripPattern>, trip_times: TripTimes, service_date: NaiveDate) -> Self {
        Self {
            pattern,
            trip_times,
            service_date,
            added_trip_on_service_date: None,
            trip_creation: false,
            route_creation: false,
            producer: None,
        }
    }

    /// Mark this update as creating its trip, and its route if
    /// `route_creation` is set.
    pub fn with_added_trip(
        mut self,
        trip_on_service_date: Arc<TripOnServiceDate>,
        route_creation: bool,
    ) -> Self {
        self.added_trip_on_service_date = Some(trip_on_service_date);
        self.trip_creation = true;
        self.route_creation = route_creation;
        self
    }

    pub fn with_producer(mut self, producer: Option<String>) -> Self {
        self.producer = producer;
        self
    }
}

/// Receives the timetables changed by a commit, so indexes derived from
/// timetables can update incrementally.
pub trait TimetableIndexUpdater {
    /// `updated` holds every timetable changed since the previous commit,
    /// including planned timetables restored by a clear.
    fn update(&mut self, updated: &[Arc<Timetable>], timetables: &TimetableIndex);
}

/// Result of [`TimetableSnapshotBuffer::commit`].
#[derive(Debug)]
pub enum CommitOutcome {
    /// Nothing was dirty; the buffer stays open.
    Unchanged(Arc<TimetableSnapshot>),
    /// A new snapshot was frozen. The committed buffer is now read-only and
    /// `successor` continues from the same state.
    Published {
        snapshot: Arc<TimetableSnapshot>,
        successor: TimetableSnapshotBuffer,
    },
}

type TimetableKey = (FeedScopedId, NaiveDate);

/// Staging area owned by the single writer.
///
/// Every mutator checks the read-only flag first and fails with
/// [`ConcurrentModification`] once the buffer has been committed.
#[derive(Debug)]
pub struct TimetableSnapshotBuffer {
    data: RealTimeData,
    dirty_timetables: HashMap<TimetableKey, Arc<Timetable>>,
    /// Timetables dropped by `clear`, whose planned version must be handed
    /// to the index updater on the next commit.
    to_restore: HashMap<TimetableKey, Arc<TripPattern>>,
    dirty: bool,
    read_only: bool,
    last_published: Arc<TimetableSnapshot>,
}

impl Default for TimetableSnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimetableSnapshotBuffer {
    pub fn new() -> Self {
        Self {
            data: RealTimeData::default(),
            dirty_timetables: HashMap::new(),
            to_restore: HashMap::new(),
            dirty: false,
            read_only: false,
            last_published: Arc::new(TimetableSnapshot::empty()),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn dirty_timetable_count(&self) -> usize {
        self.dirty_timetables.len()
    }

    /// The snapshot most recently frozen from this buffer's lineage.
    pub fn last_published(&self) -> &Arc<TimetableSnapshot> {
        &self.last_published
    }

    fn check_writable(&self, operation: &'static str) -> Result<(), ConcurrentModification> {
        if self.read_only {
            Err(ConcurrentModification { operation })
        } else {
            Ok(())
        }
    }

    /// Stage one trip's real-time row, replacing any row staged earlier for
    /// the same trip and date.
    pub fn update(&mut self, update: RealTimeTripUpdate) -> Result<(), ConcurrentModification> {
        self.check_writable("update")?;
        let RealTimeTripUpdate {
            pattern,
            trip_times,
            service_date,
            added_trip_on_service_date,
            trip_creation,
            route_creation,
            producer,
        } = update;

        let trip = Arc::clone(trip_times.trip());
        let key = TripIdAndServiceDate::new(trip.id.clone(), service_date);
        let updated = self
            .resolve(&pattern, service_date)
            .copy_for_service_date(service_date)
            .with_trip_times(trip_times);
        self.swap_timetable(&pattern, service_date, Arc::new(updated));

        if pattern.created_by_realtime() {
            Arc::make_mut(&mut self.data.new_patterns_for_modified_trips)
                .insert(key.clone(), Arc::clone(&pattern));
            let patterns_for_stop = Arc::make_mut(&mut self.data.patterns_for_stop);
            for stop in pattern.stop_pattern().stops() {
                patterns_for_stop
                    .entry(stop.stop.id.clone())
                    .or_default()
                    .insert(pattern.id().clone(), Arc::clone(&pattern));
            }
        } else {
            Arc::make_mut(&mut self.data.scheduled_patterns_for_trips)
                .insert(key.clone(), Arc::clone(&pattern));
        }

        if route_creation {
            let route = Arc::clone(pattern.route());
            Arc::make_mut(&mut self.data.added_routes).insert(route.id.clone(), route);
        }

        if trip_creation {
            Arc::make_mut(&mut self.data.added_trips).insert(trip.id.clone(), Arc::clone(&trip));
            Arc::make_mut(&mut self.data.added_pattern_for_trip)
                .insert(trip.id.clone(), Arc::clone(&pattern));
            Arc::make_mut(&mut self.data.added_patterns_for_route)
                .entry(pattern.route().id.clone())
                .or_default()
                .insert(pattern.id().clone(), Arc::clone(&pattern));
            if let Some(dated) = added_trip_on_service_date {
                Arc::make_mut(&mut self.data.added_trips_on_service_date_by_id)
                    .insert(dated.id.clone(), Arc::clone(&dated));
                Arc::make_mut(&mut self.data.added_trips_on_service_date).insert(key, dated);
            }
        }

        debug!(
            trip = %trip.id,
            pattern = %pattern.id(),
            date = %service_date,
            producer = producer.as_deref().unwrap_or("-"),
            "staged trip update"
        );
        self.dirty = true;
        Ok(())
    }

    /// Remove all real-time data of one feed: timetables of its patterns,
    /// modified-trip patterns and every entity added in real time.
    ///
    /// Returns true if anything was removed.
    pub fn clear(&mut self, feed_id: &str) -> Result<bool, ConcurrentModification> {
        self.check_writable("clear")?;
        let mut changed = false;

        if self
            .data
            .timetables
            .keys()
            .any(|id| id.is_in_feed(feed_id))
        {
            let timetables = Arc::make_mut(&mut self.data.timetables);
            let cleared: Vec<FeedScopedId> = timetables
                .keys()
                .filter(|id| id.is_in_feed(feed_id))
                .cloned()
                .collect();
            for pattern_id in cleared {
                if let Some(removed) = timetables.remove(&pattern_id) {
                    for (date, _) in removed.iter() {
                        self.to_restore.insert(
                            (pattern_id.clone(), date),
                            Arc::clone(removed.pattern()),
                        );
                    }
                }
            }
            self.dirty_timetables
                .retain(|(pattern_id, _), _| !pattern_id.is_in_feed(feed_id));
            changed = true;
        }

        changed |= retain(&mut self.data.new_patterns_for_modified_trips, |k, _| {
            !k.trip_id.is_in_feed(feed_id)
        });
        changed |= retain(&mut self.data.scheduled_patterns_for_trips, |k, _| {
            !k.trip_id.is_in_feed(feed_id)
        });
        changed |= retain(&mut self.data.added_routes, |id, _| !id.is_in_feed(feed_id));
        changed |= retain(&mut self.data.added_trips, |id, _| !id.is_in_feed(feed_id));
        changed |= retain(&mut self.data.added_pattern_for_trip, |id, _| {
            !id.is_in_feed(feed_id)
        });
        changed |= retain(&mut self.data.added_patterns_for_route, |id, _| {
            !id.is_in_feed(feed_id)
        });
        changed |= retain(&mut self.data.added_trips_on_service_date_by_id, |id, _| {
            !id.is_in_feed(feed_id)
        });
        changed |= retain(&mut self.data.added_trips_on_service_date, |k, _| {
            !k.trip_id.is_in_feed(feed_id)
        });
        changed |= retain_patterns_for_stop(&mut self.data, |p| !p.id().is_in_feed(feed_id));

        if changed {
            debug!(feed = feed_id, "cleared real-time data for feed");
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Discard all real-time changes for one trip on one date.
    ///
    /// The trip is removed from any real-time pattern it was moved to, and
    /// its row in the planned pattern is reset to the planned times. When
    /// that leaves the date's timetable identical to the plan, the copy is
    /// dropped so lookups return the planned timetable itself.
    ///
    /// Returns true if anything changed.
    pub fn revert_trip_to_scheduled_trip_pattern(
        &mut self,
        trip_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> Result<bool, ConcurrentModification> {
        self.check_writable("revert_trip_to_scheduled_trip_pattern")?;
        let key = TripIdAndServiceDate::new(trip_id.clone(), service_date);
        let mut changed = false;

        if self.data.new_patterns_for_modified_trips.contains_key(&key) {
            let modified = Arc::make_mut(&mut self.data.new_patterns_for_modified_trips)
                .remove(&key);
            if let Some(pattern) = modified {
                if let Some(timetable) = self.realtime_timetable(pattern.id(), service_date) {
                    let remaining = timetable.without_trip(trip_id);
                    self.swap_timetable(&pattern, service_date, Arc::new(remaining));
                }
                changed = true;
            }
        }

        if self.data.scheduled_patterns_for_trips.contains_key(&key) {
            let scheduled = Arc::make_mut(&mut self.data.scheduled_patterns_for_trips)
                .remove(&key);
            if let Some(pattern) = scheduled {
                changed |= self.restore_scheduled_row(&pattern, trip_id, service_date);
            }
        }

        if changed {
            debug!(trip = %trip_id, date = %service_date, "reverted trip to planned pattern");
            self.dirty = true;
        }
        Ok(changed)
    }

    fn restore_scheduled_row(
        &mut self,
        pattern: &Arc<TripPattern>,
        trip_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> bool {
        let Some(timetable) = self.realtime_timetable(pattern.id(), service_date) else {
            return false;
        };
        let planned_row = pattern.scheduled_timetable().trip_times_for(trip_id).cloned();
        let restored = match planned_row {
            Some(row) => timetable.with_trip_times(TripTimes::clone(&row)),
            None => timetable.without_trip(trip_id),
        };

        if restored.has_realtime_data() {
            self.swap_timetable(pattern, service_date, Arc::new(restored));
        } else {
            let key = (pattern.id().clone(), service_date);
            let timetables = Arc::make_mut(&mut self.data.timetables);
            if let Some(entry) = timetables.get_mut(pattern.id()) {
                entry.remove(service_date);
                if entry.is_empty() {
                    timetables.remove(pattern.id());
                }
            }
            self.dirty_timetables.remove(&key);
            self.to_restore.insert(key, Arc::clone(pattern));
        }
        true
    }

    /// Drop real-time data for service dates before `horizon`.
    ///
    /// Added trips, their patterns and routes go too once no remaining
    /// timetable holds a row for them. Returns true if anything was removed.
    pub fn purge_expired_data(&mut self, horizon: NaiveDate) -> Result<bool, ConcurrentModification> {
        self.check_writable("purge_expired_data")?;
        let mut changed = false;

        let expired = self
            .data
            .timetables
            .values()
            .any(|pt| pt.iter().any(|(date, _)| date < horizon));
        if expired {
            let timetables = Arc::make_mut(&mut self.data.timetables);
            for pt in timetables.values_mut() {
                pt.retain_dates(|date| date >= horizon);
            }
            timetables.retain(|_, pt| !pt.is_empty());
            self.dirty_timetables.retain(|(_, date), _| *date >= horizon);
            self.to_restore.retain(|(_, date), _| *date >= horizon);
            changed = true;
        }

        changed |= retain(&mut self.data.new_patterns_for_modified_trips, |k, _| {
            k.service_date >= horizon
        });
        changed |= retain(&mut self.data.scheduled_patterns_for_trips, |k, _| {
            k.service_date >= horizon
        });
        changed |= retain(&mut self.data.added_trips_on_service_date, |k, _| {
            k.service_date >= horizon
        });
        changed |= retain(&mut self.data.added_trips_on_service_date_by_id, |_, d| {
            d.service_date >= horizon
        });

        // Added entities survive while a remaining timetable still uses them
        let live_trips: HashSet<FeedScopedId> = self
            .data
            .timetables
            .values()
            .filter(|pt| pt.pattern().created_by_realtime())
            .flat_map(|pt| pt.iter())
            .flat_map(|(_, t)| t.trip_times().iter().map(|row| row.trip_id().clone()))
            .collect();
        changed |= retain(&mut self.data.added_trips, |id, _| live_trips.contains(id));
        changed |= retain(&mut self.data.added_pattern_for_trip, |id, _| {
            live_trips.contains(id)
        });
        let live_patterns: HashSet<FeedScopedId> = self
            .data
            .timetables
            .values()
            .filter(|pt| pt.pattern().created_by_realtime())
            .map(|pt| pt.pattern().id().clone())
            .collect();
        let live_added_patterns: HashSet<FeedScopedId> = self
            .data
            .added_pattern_for_trip
            .values()
            .map(|p| p.id().clone())
            .collect();
        if self
            .data
            .added_patterns_for_route
            .values()
            .flat_map(|patterns| patterns.keys())
            .any(|id| !live_added_patterns.contains(id))
        {
            let by_route = Arc::make_mut(&mut self.data.added_patterns_for_route);
            for patterns in by_route.values_mut() {
                patterns.retain(|id, _| live_added_patterns.contains(id));
            }
            by_route.retain(|_, patterns| !patterns.is_empty());
            changed = true;
        }
        let live_routes: HashSet<FeedScopedId> = self
            .data
            .added_pattern_for_trip
            .values()
            .map(|p| p.route().id.clone())
            .collect();
        changed |= retain(&mut self.data.added_routes, |id, _| live_routes.contains(id));
        changed |= retain_patterns_for_stop(&mut self.data, |p| live_patterns.contains(p.id()));

        if changed {
            debug!(%horizon, "purged expired real-time data");
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Freeze the staged state into a new snapshot.
    ///
    /// Without `force` and with nothing dirty this is a no-op returning the
    /// last published snapshot. Otherwise the index updater (if any) sees
    /// every changed timetable, this buffer becomes read-only, and a fresh
    /// buffer continuing from the same state is returned with the snapshot.
    pub fn commit(
        &mut self,
        index_updater: Option<&mut dyn TimetableIndexUpdater>,
        force: bool,
    ) -> Result<CommitOutcome, ConcurrentModification> {
        self.check_writable("commit")?;
        if !force && !self.dirty {
            return Ok(CommitOutcome::Unchanged(Arc::clone(&self.last_published)));
        }

        let snapshot = Arc::new(TimetableSnapshot::new(self.data.clone()));

        if let Some(updater) = index_updater {
            let mut updated: Vec<(TimetableKey, Arc<Timetable>)> = self
                .dirty_timetables
                .iter()
                .map(|(k, t)| (k.clone(), Arc::clone(t)))
                .collect();
            for (key, pattern) in &self.to_restore {
                if !self.dirty_timetables.contains_key(key) {
                    let planned = pattern.scheduled_timetable().copy_for_service_date(key.1);
                    updated.push((key.clone(), Arc::new(planned)));
                }
            }
            updated.sort_by(|a, b| a.0.cmp(&b.0));
            let updated: Vec<_> = updated.into_iter().map(|(_, t)| t).collect();
            updater.update(&updated, snapshot.timetables());
        }

        debug!(
            timetables = snapshot.timetable_count(),
            dirty = self.dirty_timetables.len(),
            restored = self.to_restore.len(),
            "committed timetable snapshot"
        );

        self.read_only = true;
        let successor = TimetableSnapshotBuffer {
            data: self.data.clone(),
            dirty_timetables: HashMap::new(),
            to_restore: HashMap::new(),
            dirty: false,
            read_only: false,
            last_published: Arc::clone(&snapshot),
        };
        Ok(CommitOutcome::Published {
            snapshot,
            successor,
        })
    }

    fn swap_timetable(
        &mut self,
        pattern: &Arc<TripPattern>,
        service_date: NaiveDate,
        timetable: Arc<Timetable>,
    ) {
        Arc::make_mut(&mut self.data.timetables)
            .entry(pattern.id().clone())
            .or_insert_with(|| PatternTimetables::new(Arc::clone(pattern)))
            .insert(service_date, Arc::clone(&timetable));
        let key = (pattern.id().clone(), service_date);
        self.to_restore.remove(&key);
        self.dirty_timetables.insert(key, timetable);
    }
}

impl TimetableRepository for TimetableSnapshotBuffer {
    fn data(&self) -> &RealTimeData {
        &self.data
    }
}

impl fmt::Display for TimetableSnapshotBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timetable snapshot: {} timetables ({} dirty)",
            self.timetable_count(),
            self.dirty_timetables.len()
        )
    }
}

/// Retain entries of a shared map, copying it only if something goes.
fn retain<K, V>(map: &mut Arc<HashMap<K, V>>, mut keep: impl FnMut(&K, &V) -> bool) -> bool
where
    K: Clone + Eq + std::hash::Hash,
    V: Clone,
{
    if map.iter().all(|(k, v)| keep(k, v)) {
        return false;
    }
    Arc::make_mut(map).retain(|k, v| keep(k, v));
    true
}

fn retain_patterns_for_stop(
    data: &mut RealTimeData,
    mut keep: impl FnMut(&TripPattern) -> bool,
) -> bool {
    let any_removed = data
        .patterns_for_stop
        .values()
        .flat_map(BTreeMap::values)
        .any(|p| !keep(p));
    if !any_removed {
        return false;
    }
    let by_stop = Arc::make_mut(&mut data.patterns_for_stop);
    for patterns in by_stop.values_mut() {
        patterns.retain(|_, p| keep(p));
    }
    by_stop.retain(|_, patterns| !patterns.is_empty());
    true
}


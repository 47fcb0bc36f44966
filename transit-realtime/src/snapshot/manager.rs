//! Ownership of the open buffer and publication of committed snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::NaiveDate;
use tracing::{debug, info};

use super::buffer::{
    CommitOutcome, ConcurrentModification, TimetableIndexUpdater, TimetableSnapshotBuffer,
};
use super::published::TimetableSnapshot;
use crate::config::EngineConfig;
use crate::domain::FeedScopedId;

/// Cheap, cloneable handle for reading the current snapshot.
///
/// `current()` pins the snapshot for as long as the caller holds the
/// returned `Arc`; later commits do not affect it.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    published: Arc<ArcSwap<TimetableSnapshot>>,
}

impl SnapshotSource {
    pub fn current(&self) -> Arc<TimetableSnapshot> {
        self.published.load_full()
    }
}

/// Owns the one open buffer and publishes what it commits.
///
/// Only the writer holds a manager. Readers get a [`SnapshotSource`].
pub struct TimetableSnapshotManager {
    buffer: TimetableSnapshotBuffer,
    published: Arc<ArcSwap<TimetableSnapshot>>,
    index_updater: Option<Box<dyn TimetableIndexUpdater + Send>>,
    max_snapshot_frequency: Duration,
    last_commit: Option<Instant>,
    purge_expired_data: bool,
    retention: chrono::Duration,
    last_purge_date: Option<NaiveDate>,
}

impl TimetableSnapshotManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            buffer: TimetableSnapshotBuffer::new(),
            published: Arc::new(ArcSwap::from_pointee(TimetableSnapshot::empty())),
            index_updater: None,
            max_snapshot_frequency: config.max_snapshot_frequency(),
            last_commit: None,
            purge_expired_data: config.purge_expired_data,
            retention: config.retention(),
            last_purge_date: None,
        }
    }

    /// Install the callback that sees changed timetables on each commit.
    pub fn with_index_updater(mut self, updater: Box<dyn TimetableIndexUpdater + Send>) -> Self {
        self.index_updater = Some(updater);
        self
    }

    pub fn source(&self) -> SnapshotSource {
        SnapshotSource {
            published: Arc::clone(&self.published),
        }
    }

    pub fn current(&self) -> Arc<TimetableSnapshot> {
        self.published.load_full()
    }

    pub fn buffer(&self) -> &TimetableSnapshotBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TimetableSnapshotBuffer {
        &mut self.buffer
    }

    /// Commit and publish the buffer if it has changes.
    ///
    /// Unless `force` is set, commits happen at most once per configured
    /// snapshot interval; changes made in between wait for the next call.
    /// Returns the newly published snapshot, if any.
    pub fn commit_if_needed(
        &mut self,
        force: bool,
    ) -> Result<Option<Arc<TimetableSnapshot>>, ConcurrentModification> {
        if !force && !self.buffer.is_dirty() {
            return Ok(None);
        }
        if !force
            && self
                .last_commit
                .is_some_and(|last| last.elapsed() < self.max_snapshot_frequency)
        {
            return Ok(None);
        }

        let updater = self
            .index_updater
            .as_deref_mut()
            .map(|u| u as &mut dyn TimetableIndexUpdater);
        match self.buffer.commit(updater, force)? {
            CommitOutcome::Unchanged(_) => Ok(None),
            CommitOutcome::Published {
                snapshot,
                successor,
            } => {
                self.buffer = successor;
                self.published.store(Arc::clone(&snapshot));
                self.last_commit = Some(Instant::now());
                debug!(%snapshot, "published timetable snapshot");
                Ok(Some(snapshot))
            }
        }
    }

    /// Purge data older than the retention window, once per local date.
    ///
    /// Commits immediately when anything was purged. Returns true if so.
    pub fn purge_and_commit(&mut self, today: NaiveDate) -> Result<bool, ConcurrentModification> {
        if !self.purge_expired_data || self.last_purge_date.is_some_and(|d| d >= today) {
            return Ok(false);
        }
        self.last_purge_date = Some(today);
        let horizon = today - self.retention;
        let purged = self.buffer.purge_expired_data(horizon)?;
        if purged {
            info!(%horizon, "purged expired real-time data");
            self.commit_if_needed(true)?;
        }
        Ok(purged)
    }

    pub fn clear(&mut self, feed_id: &str) -> Result<bool, ConcurrentModification> {
        self.buffer.clear(feed_id)
    }

    pub fn revert_trip_to_scheduled_trip_pattern(
        &mut self,
        trip_id: &FeedScopedId,
        service_date: NaiveDate,
    ) -> Result<bool, ConcurrentModification> {
        self.buffer
            .revert_trip_to_scheduled_trip_pattern(trip_id, service_date)
    }
}

impl std::fmt::Debug for TimetableSnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimetableSnapshotManager")
            .field("buffer", &self.buffer)
            .field("has_index_updater", &self.index_updater.is_some())
            .field("max_snapshot_frequency", &self.max_snapshot_frequency)
            .field("last_purge_date", &self.last_purge_date)
            .finish()
    }
}

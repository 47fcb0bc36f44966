//! The single writer task.
//!
//! All mutation of real-time state happens on one task that owns the
//! snapshot manager, the pattern cache and both adapters. Batches arrive
//! over a channel and are applied one at a time, so every commit sees only
//! whole batches. Readers use the [`SnapshotSource`] of a [`WriterHandle`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::schedule::TransitModel;
use crate::snapshot::{
    ConcurrentModification, SnapshotSource, TimetableRepository, TimetableSnapshotManager,
};
use crate::updater::gtfs::{GtfsRealtimeTripUpdateAdapter, TripUpdate};
use crate::updater::siri::{EstimatedVehicleJourney, SiriTripUpdateAdapter};
use crate::updater::{Incrementality, TripPatternCache, UpdateResult};

/// Pending batches the writer accepts before submitters wait.
const QUEUE_DEPTH: usize = 64;

/// One delivery from a real-time source.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum UpdateBatch {
    Siri {
        #[serde(default)]
        incrementality: Incrementality,
        journeys: Vec<EstimatedVehicleJourney>,
        /// Match unresolved journeys by time and place.
        #[serde(default)]
        fuzzy: bool,
    },
    Gtfs {
        #[serde(default)]
        incrementality: Incrementality,
        updates: Vec<TripUpdate>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("writer task has stopped")]
    Closed,

    #[error(transparent)]
    ConcurrentModification(#[from] ConcurrentModification),
}

struct Request {
    batch: UpdateBatch,
    reply: oneshot::Sender<Result<UpdateResult, ConcurrentModification>>,
}

/// Submits batches to the writer and reads what it publishes.
///
/// The writer stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    requests: mpsc::Sender<Request>,
    source: SnapshotSource,
}

impl WriterHandle {
    /// Apply a batch and wait for its result.
    ///
    /// The batch is staged completely before the writer looks at anything
    /// else. It becomes visible to readers with the next commit.
    pub async fn submit(&self, batch: UpdateBatch) -> Result<UpdateResult, WriterError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { batch, reply })
            .await
            .map_err(|_| WriterError::Closed)?;
        let result = response.await.map_err(|_| WriterError::Closed)?;
        Ok(result?)
    }

    pub fn snapshots(&self) -> &SnapshotSource {
        &self.source
    }
}

/// Start the writer on the current tokio runtime.
///
/// Returns a handle for submitting batches and the task itself, which
/// finishes after the final commit once all handles are gone.
pub fn spawn_writer(
    model: Arc<TransitModel>,
    manager: TimetableSnapshotManager,
    config: &EngineConfig,
) -> (WriterHandle, JoinHandle<()>) {
    let (requests, receiver) = mpsc::channel(QUEUE_DEPTH);
    let handle = WriterHandle {
        requests,
        source: manager.source(),
    };
    let writer = Writer {
        siri: SiriTripUpdateAdapter::new(Arc::clone(&model), config),
        gtfs: GtfsRealtimeTripUpdateAdapter::new(Arc::clone(&model), config),
        zone: model.time_zone(),
        cache: TripPatternCache::new(),
        manager,
        fuzzy_trip_matching: config.fuzzy_trip_matching,
        tick: config.max_snapshot_frequency().max(Duration::from_millis(1)),
    };
    let task = tokio::spawn(writer.run(receiver));
    (handle, task)
}

struct Writer {
    siri: SiriTripUpdateAdapter,
    gtfs: GtfsRealtimeTripUpdateAdapter,
    zone: Tz,
    cache: TripPatternCache,
    manager: TimetableSnapshotManager,
    fuzzy_trip_matching: bool,
    tick: Duration,
}

impl Writer {
    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(feed = self.siri.feed_id(), "writer started");

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(Request { batch, reply }) = request else {
                        break;
                    };
                    let result = self.apply(batch);
                    if let Err(err) = &result {
                        error!(%err, "batch aborted");
                    }
                    // The submitter may have given up waiting
                    let _ = reply.send(result);
                }
                _ = ticker.tick() => self.on_tick(),
            }
        }

        if let Err(err) = self.commit_pending() {
            error!(%err, "final commit failed");
        }
        info!(snapshot = %self.manager.current(), "writer stopped");
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.zone).date_naive()
    }

    fn apply(&mut self, batch: UpdateBatch) -> Result<UpdateResult, ConcurrentModification> {
        let today = self.today();
        let buffer = self.manager.buffer_mut();
        let result = match batch {
            UpdateBatch::Siri {
                incrementality,
                journeys,
                fuzzy,
            } => self.siri.apply_estimated_timetable(
                buffer,
                &mut self.cache,
                incrementality,
                &journeys,
                fuzzy || self.fuzzy_trip_matching,
            )?,
            UpdateBatch::Gtfs {
                incrementality,
                updates,
            } => self.gtfs.apply_trip_updates(
                buffer,
                &mut self.cache,
                incrementality,
                &updates,
                today,
            )?,
        };
        self.manager.commit_if_needed(false)?;
        Ok(result)
    }

    fn on_tick(&mut self) {
        let today = self.today();
        let outcome = self
            .commit_pending()
            .and_then(|()| self.manager.purge_and_commit(today));
        if let Err(err) = outcome {
            error!(%err, "periodic commit failed");
        }
    }

    /// Publish staged changes regardless of the commit interval.
    fn commit_pending(&mut self) -> Result<(), ConcurrentModification> {
        if self.manager.buffer().is_dirty() {
            if let Some(snapshot) = self.manager.commit_if_needed(true)? {
                debug!(timetables = snapshot.timetable_count(), "forced commit");
            }
        }
        Ok(())
    }
}

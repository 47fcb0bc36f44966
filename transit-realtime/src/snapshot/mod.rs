//! Staging and publication of real-time timetables.
//!
//! The single writer stages changes in a [`TimetableSnapshotBuffer`]. A
//! commit freezes the buffer into an immutable [`TimetableSnapshot`] and
//! hands the writer a fresh buffer to continue with; the committed buffer
//! refuses every further mutation. Readers go through a
//! [`SnapshotSource`], which swaps snapshots atomically.

mod buffer;
mod manager;
mod published;
mod state;

pub use buffer::{
    CommitOutcome, ConcurrentModification, RealTimeTripUpdate, TimetableIndexUpdater,
    TimetableSnapshotBuffer,
};
pub use manager::{SnapshotSource, TimetableSnapshotManager};
pub use published::TimetableSnapshot;
pub use state::{
    CanceledTrip, PatternTimetables, RealTimeData, TimetableIndex, TimetableRepository,
};

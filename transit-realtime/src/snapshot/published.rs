use std::fmt;

use super::state::{RealTimeData, TimetableRepository};

/// An immutable, committed view of the real-time state.
///
/// Snapshots have no mutating methods. Any number of readers can hold one
/// while the writer stages and commits newer ones.
#[derive(Debug, Clone, Default)]
pub struct TimetableSnapshot {
    data: RealTimeData,
}

impl TimetableSnapshot {
    pub(crate) fn new(data: RealTimeData) -> Self {
        Self { data }
    }

    /// A snapshot with no real-time data, served before the first commit.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl TimetableRepository for TimetableSnapshot {
    fn data(&self) -> &RealTimeData {
        &self.data
    }
}

impl fmt::Display for TimetableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timetable snapshot: {} timetables (committed)",
            self.timetable_count()
        )
    }
}

//! Real-time timetable snapshots for a transit network.
//!
//! Real-time messages (SIRI-ET journeys, GTFS-RT trip updates) are applied
//! by a single writer to a staging buffer of timetables. Commits freeze the
//! buffer into immutable snapshots that any number of readers can query
//! while the writer carries on.

pub mod config;
pub mod domain;
pub mod schedule;
pub mod snapshot;
pub mod updater;
pub mod validate;
pub mod writer;

#[cfg(test)]
mod fixtures;

//! GTFS-RT `TripUpdate` shapes, as decoded from the protobuf feed.
//!
//! Field names follow the GTFS-RT reference in camelCase; enum values use
//! the reference spelling.

use chrono::NaiveDate;
use serde::Deserialize;

/// One `FeedEntity` carrying a trip update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripUpdate {
    /// Entity id, for logging only.
    #[serde(default)]
    pub id: String,

    /// The entity is withdrawn and carries no update.
    #[serde(default)]
    pub is_deleted: bool,

    pub trip: TripDescriptor,

    #[serde(default)]
    pub stop_time_updates: Vec<StopTimeUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDescriptor {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    /// Service date as `YYYYMMDD`.
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    #[serde(default)]
    pub schedule_relationship: TripScheduleRelationship,
}

impl TripDescriptor {
    /// The parsed start date, if the descriptor has one.
    pub fn service_date(&self) -> Option<Result<NaiveDate, chrono::ParseError>> {
        self.start_date
            .as_deref()
            .map(|d| NaiveDate::parse_from_str(d, "%Y%m%d"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripScheduleRelationship {
    #[default]
    Scheduled,
    Added,
    New,
    Canceled,
    Deleted,
    Replacement,
    Unscheduled,
    Duplicated,
}

/// Real-time times for one stop of the trip.
///
/// Matched to the trip's stops by `stop_sequence` when present, else by
/// `stop_id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimeUpdate {
    pub stop_sequence: Option<i64>,
    pub stop_id: Option<String>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    #[serde(default)]
    pub schedule_relationship: StopScheduleRelationship,
}

/// A delay relative to the schedule, an absolute POSIX time, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimeEvent {
    pub delay: Option<i32>,
    pub time: Option<i64>,
    /// Planned time of an added stop; `time` stands in when absent.
    pub scheduled_time: Option<i64>,
}

impl StopTimeEvent {
    pub fn is_valid(&self) -> bool {
        self.delay.is_some() || self.time.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopScheduleRelationship {
    #[default]
    Scheduled,
    Skipped,
    NoData,
}

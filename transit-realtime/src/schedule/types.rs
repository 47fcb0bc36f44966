//! Schedule file DTOs.
//!
//! A compact JSON rendering of a planned schedule, used by the binary and
//! by fixtures. Ids are full `feed:id` strings and times are `H:MM[:SS]`
//! relative to the service day.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::{Direction, PickDrop, TransitMode};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFile {
    /// IANA zone name, e.g. "Europe/Oslo".
    pub time_zone: String,
    #[serde(default)]
    pub agencies: Vec<AgencyDto>,
    #[serde(default)]
    pub operators: Vec<OperatorDto>,
    #[serde(default)]
    pub stops: Vec<StopDto>,
    #[serde(default)]
    pub routes: Vec<RouteDto>,
    #[serde(default)]
    pub calendars: Vec<CalendarDto>,
    #[serde(default)]
    pub patterns: Vec<PatternDto>,
    /// Dated trips for feeds that publish them (NeTEx DatedServiceJourney).
    #[serde(default)]
    pub dated_trips: Vec<DatedTripDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgencyDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopDto {
    pub id: String,
    pub name: String,
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDto {
    pub id: String,
    pub agency: String,
    pub operator: Option<String>,
    pub short_name: Option<String>,
    pub mode: TransitMode,
    pub sub_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDto {
    pub service_id: String,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternDto {
    pub id: String,
    pub route: String,
    pub stops: Vec<PatternStopDto>,
    pub trips: Vec<TripDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternStopDto {
    pub stop: String,
    #[serde(default)]
    pub pickup: PickDrop,
    #[serde(default)]
    pub dropoff: PickDrop,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDto {
    pub id: String,
    pub service_id: String,
    #[serde(default)]
    pub direction: Direction,
    pub short_name: Option<String>,
    /// One entry per pattern stop.
    pub stop_times: Vec<StopTimeDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimeDto {
    pub arrival: String,
    pub departure: String,
    /// Defaults to the position in the pattern.
    pub stop_sequence: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatedTripDto {
    pub id: String,
    pub trip: String,
    pub service_date: NaiveDate,
    #[serde(default)]
    pub replacement_for: Vec<String>,
}

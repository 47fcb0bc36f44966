//! SIRI-ET message shapes.
//!
//! These mirror the parts of `EstimatedVehicleJourney` the updater reads,
//! as they arrive once the XML has been decoded upstream. Field names
//! follow the SIRI element names in camelCase. Almost everything is
//! optional because producers omit elements freely.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;

/// One vehicle journey as reported in an estimated timetable delivery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedVehicleJourney {
    /// Line the journey runs on, as a route id.
    pub line_ref: Option<String>,

    /// Service date plus journey id.
    pub framed_vehicle_journey_ref: Option<FramedVehicleJourneyRef>,

    /// Id of a dated trip, or of the trip itself.
    pub dated_vehicle_journey_ref: Option<String>,

    /// Journey code. For extra journeys this becomes the new trip id.
    pub estimated_vehicle_journey_code: Option<String>,

    pub vehicle_mode: Option<VehicleMode>,

    pub operator_ref: Option<String>,

    pub published_line_name: Option<String>,

    /// Line of the journey an extra journey replaces.
    pub external_line_ref: Option<String>,

    /// Dated trip an extra journey replaces.
    pub vehicle_journey_ref: Option<String>,

    /// Further dated trips an extra journey replaces.
    #[serde(default)]
    pub additional_vehicle_journey_refs: Vec<String>,

    /// The producer of this journey.
    pub data_source: Option<String>,

    /// Whether the producer tracks the vehicle. Absent means not monitored.
    pub monitored: Option<bool>,

    #[serde(default)]
    pub cancellation: bool,

    #[serde(default)]
    pub extra_journey: bool,

    #[serde(default)]
    pub prediction_inaccurate: bool,

    /// Calls the vehicle has already made.
    #[serde(default)]
    pub recorded_calls: Vec<Call>,

    /// Calls still ahead.
    #[serde(default)]
    pub estimated_calls: Vec<Call>,
}

impl EstimatedVehicleJourney {
    /// Recorded calls followed by estimated ones, flagged accordingly.
    pub fn calls(&self) -> impl Iterator<Item = (bool, &Call)> {
        self.recorded_calls
            .iter()
            .map(|c| (true, c))
            .chain(self.estimated_calls.iter().map(|c| (false, c)))
    }

    pub fn call_count(&self) -> usize {
        self.recorded_calls.len() + self.estimated_calls.len()
    }

    /// The most specific journey reference, for logging.
    pub fn reference(&self) -> Option<&str> {
        self.framed_vehicle_journey_ref
            .as_ref()
            .map(|f| f.dated_vehicle_journey_ref.as_str())
            .or(self.dated_vehicle_journey_ref.as_deref())
            .or(self.estimated_vehicle_journey_code.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramedVehicleJourneyRef {
    /// The service date.
    pub data_frame_ref: NaiveDate,
    pub dated_vehicle_journey_ref: String,
}

/// A recorded or estimated call at one stop.
///
/// Recorded calls use the actual times; estimated calls never carry them.
/// Boarding activities are only reported on estimated calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub stop_point_ref: String,
    pub order: Option<u32>,

    #[serde(default)]
    pub extra_call: bool,

    #[serde(default)]
    pub cancellation: bool,

    #[serde(default)]
    pub prediction_inaccurate: bool,

    pub aimed_arrival_time: Option<DateTime<FixedOffset>>,
    pub expected_arrival_time: Option<DateTime<FixedOffset>>,
    pub actual_arrival_time: Option<DateTime<FixedOffset>>,
    pub aimed_departure_time: Option<DateTime<FixedOffset>>,
    pub expected_departure_time: Option<DateTime<FixedOffset>>,
    pub actual_departure_time: Option<DateTime<FixedOffset>>,

    pub arrival_status: Option<CallStatus>,
    pub departure_status: Option<CallStatus>,
    pub arrival_boarding_activity: Option<ArrivalBoardingActivity>,
    pub departure_boarding_activity: Option<DepartureBoardingActivity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallStatus {
    OnTime,
    Early,
    Delayed,
    Cancelled,
    Arrived,
    Departed,
    Missed,
    NoReport,
    NotExpected,
    /// Any status this updater does not act on.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrivalBoardingActivity {
    Alighting,
    NoAlighting,
    PassThru,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepartureBoardingActivity {
    Boarding,
    NoBoarding,
    PassThru,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VehicleMode {
    Air,
    Bus,
    Coach,
    Ferry,
    Metro,
    Rail,
    Tram,
    #[serde(other)]
    Other,
}

//! Trips and dated trips.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{FeedScopedId, Route, TransitMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
    #[default]
    Unknown,
}

/// How a trip relates to the planned service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TripAlteration {
    #[default]
    Planned,
    /// Runs in place of one or more planned trips.
    Replaced,
    /// Not planned at all.
    Extra,
}

/// A vehicle journey following one route.
///
/// Trips are never mutated once built. Real-time processing creates new
/// trips for extra journeys and otherwise only changes times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip {
    pub id: FeedScopedId,
    pub route: Arc<Route>,
    pub service_id: FeedScopedId,
    pub direction: Direction,
    pub mode: TransitMode,
    pub sub_mode: Option<String>,
    pub short_name: Option<String>,
    pub alteration: TripAlteration,
}

impl Trip {
    /// Create a planned trip that inherits mode from its route.
    pub fn new(id: FeedScopedId, route: Arc<Route>, service_id: FeedScopedId) -> Self {
        Self {
            id,
            mode: route.mode,
            sub_mode: route.sub_mode.clone(),
            route,
            service_id,
            direction: Direction::Unknown,
            short_name: None,
            alteration: TripAlteration::Planned,
        }
    }
}

/// A trip running on a specific service date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripOnServiceDate {
    pub id: FeedScopedId,
    pub trip: Arc<Trip>,
    pub service_date: NaiveDate,
    /// Dated trips this one replaces.
    pub replacement_for: Vec<FeedScopedId>,
}

//! Domain types for the real-time transit model.
//!
//! These types describe the network (routes, stops), the planned service
//! (trips, patterns, timetables) and the real-time state of trips. Values
//! are immutable once built and shared through `Arc`, so a published
//! snapshot can hand them to any number of readers.

mod id;
mod network;
mod pattern;
mod time;
mod timetable;
mod trip;
mod trip_times;

pub use id::{FeedScopedId, InvalidFeedScopedId, TripIdAndServiceDate};
pub use network::{Agency, Operator, Route, Stop, TransitMode};
pub use pattern::{PatternKey, PatternStop, PickDrop, StopPattern, TripPattern};
pub use time::{ServiceTime, TimeError, service_day_start};
pub use timetable::Timetable;
pub use trip::{Direction, Trip, TripAlteration, TripOnServiceDate};
pub use trip_times::{
    CancelationKind, RealTimeChange, RealTimeState, RealTimeStateKind, RealTimeStopTime,
    RealTimeTimes, RealTimeTripTimesBuilder, ScheduledStopTime, StopRealTimeFlags, TripTimes,
};

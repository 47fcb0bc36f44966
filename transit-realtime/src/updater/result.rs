//! Outcome reporting for update batches.
//!
//! Every entity of a batch ends up as either an [`UpdateSuccess`] or an
//! [`UpdateError`]. Entity failures are data, not errors: they are
//! collected in an [`UpdateResult`] and never abort the batch.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::FeedScopedId;
use crate::validate::ValidationError;

/// Why one entity of a batch could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateErrorType {
    TripNotFound,
    NoFuzzyTripMatch,
    CannotResolveAgency,
    NotMonitored,
    NegativeHopTime,
    NegativeDwellTime,
    /// A combination of message fields that is not classified further
    Unknown,
    TripNotFoundInPattern,
    NoStartDate,
    NoServiceOnDate,
    NoUpdates,
    TooFewStops,
    NoValidStops,
    StopMismatch,
    UnknownStop,
    EmptyStopPointRef,
    InvalidStopSequence,
    InvalidArrivalTime,
    InvalidDepartureTime,
    NoTripForCancellationFound,
    TripAlreadyExists,
    NotImplementedUnscheduled,
    NotImplementedDuplicated,
    NotImplementedExtraCall,
}

impl UpdateErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateErrorType::TripNotFound => "TRIP_NOT_FOUND",
            UpdateErrorType::NoFuzzyTripMatch => "NO_FUZZY_TRIP_MATCH",
            UpdateErrorType::CannotResolveAgency => "CANNOT_RESOLVE_AGENCY",
            UpdateErrorType::NotMonitored => "NOT_MONITORED",
            UpdateErrorType::NegativeHopTime => "NEGATIVE_HOP_TIME",
            UpdateErrorType::NegativeDwellTime => "NEGATIVE_DWELL_TIME",
            UpdateErrorType::Unknown => "UNKNOWN",
            UpdateErrorType::TripNotFoundInPattern => "TRIP_NOT_FOUND_IN_PATTERN",
            UpdateErrorType::NoStartDate => "NO_START_DATE",
            UpdateErrorType::NoServiceOnDate => "NO_SERVICE_ON_DATE",
            UpdateErrorType::NoUpdates => "NO_UPDATES",
            UpdateErrorType::TooFewStops => "TOO_FEW_STOPS",
            UpdateErrorType::NoValidStops => "NO_VALID_STOPS",
            UpdateErrorType::StopMismatch => "STOP_MISMATCH",
            UpdateErrorType::UnknownStop => "UNKNOWN_STOP",
            UpdateErrorType::EmptyStopPointRef => "EMPTY_STOP_POINT_REF",
            UpdateErrorType::InvalidStopSequence => "INVALID_STOP_SEQUENCE",
            UpdateErrorType::InvalidArrivalTime => "INVALID_ARRIVAL_TIME",
            UpdateErrorType::InvalidDepartureTime => "INVALID_DEPARTURE_TIME",
            UpdateErrorType::NoTripForCancellationFound => "NO_TRIP_FOR_CANCELLATION_FOUND",
            UpdateErrorType::TripAlreadyExists => "TRIP_ALREADY_EXISTS",
            UpdateErrorType::NotImplementedUnscheduled => "NOT_IMPLEMENTED_UNSCHEDULED",
            UpdateErrorType::NotImplementedDuplicated => "NOT_IMPLEMENTED_DUPLICATED",
            UpdateErrorType::NotImplementedExtraCall => "NOT_IMPLEMENTED_EXTRA_CALL",
        }
    }
}

impl fmt::Display for UpdateErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ValidationError> for UpdateErrorType {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NotMonitored => UpdateErrorType::NotMonitored,
            ValidationError::NegativeHopTime { .. } => UpdateErrorType::NegativeHopTime,
            ValidationError::NegativeDwellTime { .. } => UpdateErrorType::NegativeDwellTime,
        }
    }
}

/// A failed entity, with the trip it concerned when that is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateError {
    pub trip_id: Option<FeedScopedId>,
    pub error_type: UpdateErrorType,
    pub stop_index: Option<usize>,
    /// The data source named by the message.
    pub producer: Option<String>,
}

impl UpdateError {
    pub fn new(trip_id: Option<FeedScopedId>, error_type: UpdateErrorType) -> Self {
        Self {
            trip_id,
            error_type,
            stop_index: None,
            producer: None,
        }
    }

    pub fn no_trip_id(error_type: UpdateErrorType) -> Self {
        Self::new(None, error_type)
    }

    /// Map a validation failure, keeping its stop index.
    pub fn from_validation(trip_id: Option<FeedScopedId>, err: ValidationError) -> Self {
        Self {
            stop_index: err.stop_index(),
            ..Self::new(trip_id, err.into())
        }
    }

    pub fn with_stop_index(mut self, stop_index: usize) -> Self {
        self.stop_index = Some(stop_index);
        self
    }

    pub fn with_producer(mut self, producer: Option<&str>) -> Self {
        self.producer = producer.map(str::to_string);
        self
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_type)?;
        if let Some(trip_id) = &self.trip_id {
            write!(f, " for trip {trip_id}")?;
        }
        if let Some(stop_index) = self.stop_index {
            write!(f, " at stop {stop_index}")?;
        }
        if let Some(producer) = &self.producer {
            write!(f, " from {producer}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UpdateError {}

/// Something worth reporting about an entity that was still applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateWarning {
    UnknownStopsRemovedFromAddedTrip,
}

impl fmt::Display for UpdateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateWarning::UnknownStopsRemovedFromAddedTrip => {
                f.write_str("UNKNOWN_STOPS_REMOVED_FROM_ADDED_TRIP")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSuccess {
    pub warnings: Vec<UpdateWarning>,
    pub producer: Option<String>,
}

impl UpdateSuccess {
    pub fn no_warnings() -> Self {
        Self::default()
    }

    pub fn with_warnings(warnings: Vec<UpdateWarning>) -> Self {
        Self {
            warnings,
            producer: None,
        }
    }

    pub fn with_producer(mut self, producer: Option<&str>) -> Self {
        self.producer = producer.map(str::to_string);
        self
    }
}

/// Summary of one batch, or of several merged batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    successful: usize,
    errors: Vec<UpdateError>,
    warnings: Vec<UpdateWarning>,
}

impl UpdateResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect per-entity outcomes, keeping errors in entity order.
    pub fn of_results(results: impl IntoIterator<Item = Result<UpdateSuccess, UpdateError>>) -> Self {
        let mut result = Self::empty();
        for r in results {
            result.record(r);
        }
        result
    }

    pub fn record(&mut self, outcome: Result<UpdateSuccess, UpdateError>) {
        match outcome {
            Ok(success) => {
                self.successful += 1;
                self.warnings.extend(success.warnings);
            }
            Err(error) => self.errors.push(error),
        }
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    /// Errors in the order the entities were processed.
    pub fn errors(&self) -> &[UpdateError] {
        &self.errors
    }

    pub fn error_types(&self) -> Vec<UpdateErrorType> {
        self.errors.iter().map(|e| e.error_type).collect()
    }

    /// Errors grouped by type.
    pub fn failures(&self) -> BTreeMap<UpdateErrorType, Vec<&UpdateError>> {
        let mut grouped: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for error in &self.errors {
            grouped.entry(error.error_type).or_default().push(error);
        }
        grouped
    }

    pub fn warnings(&self) -> &[UpdateWarning] {
        &self.warnings
    }

    pub fn merge(&mut self, other: UpdateResult) {
        self.successful += other.successful;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} successful, {} failed", self.successful, self.failed())?;
        let failures = self.failures();
        if !failures.is_empty() {
            f.write_str(" (")?;
            for (i, (error_type, errors)) in failures.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{error_type}: {}", errors.len())?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

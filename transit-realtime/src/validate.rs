//! Acceptance checks for proposed trip times.
//!
//! Validation is all-or-nothing per trip. A rejected proposal never reaches
//! the snapshot buffer, so whatever was staged for the trip before stays
//! exactly as it was.

use crate::domain::ServiceTime;

/// Why a proposed set of stop times was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The source does not vouch for the data
    #[error("journey is not monitored")]
    NotMonitored,

    /// The vehicle would arrive at a stop before leaving the previous one
    #[error("negative hop time arriving at stop {stop_index}")]
    NegativeHopTime { stop_index: usize },

    /// The vehicle would leave a stop before arriving there
    #[error("negative dwell time at stop {stop_index}")]
    NegativeDwellTime { stop_index: usize },
}

impl ValidationError {
    /// The offending stop position, if the failure concerns one stop.
    pub fn stop_index(&self) -> Option<usize> {
        match self {
            ValidationError::NotMonitored => None,
            ValidationError::NegativeHopTime { stop_index }
            | ValidationError::NegativeDwellTime { stop_index } => Some(*stop_index),
        }
    }
}

/// Reject journeys the producer does not monitor.
///
/// A missing flag counts as not monitored. Cancellations are accepted either
/// way since they carry no times to distrust.
pub fn check_monitored(monitored: Option<bool>, cancellation: bool) -> Result<(), ValidationError> {
    if cancellation || monitored == Some(true) {
        Ok(())
    } else {
        Err(ValidationError::NotMonitored)
    }
}

/// Check an ordered list of `(arrival, departure)` pairs.
///
/// For each stop the hop from the previous stop is checked before the dwell
/// at the stop itself, so the first violation in trip order is reported.
///
/// # Examples
///
/// ```
/// use transit_realtime::domain::ServiceTime;
/// use transit_realtime::validate::{ValidationError, validate_times};
///
/// let t = ServiceTime::from_seconds;
/// assert!(validate_times([(t(10), t(11)), (t(20), t(21))]).is_ok());
/// assert_eq!(
///     validate_times([(t(10), t(15)), (t(14), t(21))]),
///     Err(ValidationError::NegativeHopTime { stop_index: 1 })
/// );
/// assert_eq!(
///     validate_times([(t(10), t(11)), (t(22), t(21))]),
///     Err(ValidationError::NegativeDwellTime { stop_index: 1 })
/// );
/// ```
pub fn validate_times<I>(times: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (ServiceTime, ServiceTime)>,
{
    let mut previous_departure: Option<ServiceTime> = None;
    for (stop_index, (arrival, departure)) in times.into_iter().enumerate() {
        if previous_departure.is_some_and(|prev| prev > arrival) {
            return Err(ValidationError::NegativeHopTime { stop_index });
        }
        if arrival > departure {
            return Err(ValidationError::NegativeDwellTime { stop_index });
        }
        previous_departure = Some(departure);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ServiceTime {
        ServiceTime::parse(s).unwrap()
    }

    #[test]
    fn accepts_equal_times() {
        let times = [(t("0:01"), t("0:01")), (t("0:01"), t("0:01"))];
        assert!(validate_times(times).is_ok());
    }

    #[test]
    fn accepts_empty_and_single_stop() {
        assert!(validate_times(Vec::<(ServiceTime, ServiceTime)>::new()).is_ok());
        assert!(validate_times([(t("0:01"), t("0:02"))]).is_ok());
    }

    #[test]
    fn negative_hop() {
        let times = [(t("0:00:15"), t("0:00:15")), (t("0:00:14"), t("0:00:14"))];
        assert_eq!(
            validate_times(times),
            Err(ValidationError::NegativeHopTime { stop_index: 1 })
        );
    }

    #[test]
    fn negative_dwell() {
        let times = [
            (t("1:01"), t("1:01")),
            (t("1:13"), t("1:12")),
            (t("1:20"), t("1:21")),
        ];
        assert_eq!(
            validate_times(times),
            Err(ValidationError::NegativeDwellTime { stop_index: 1 })
        );
    }

    #[test]
    fn first_violation_wins() {
        // Dwell at stop 0 comes before the hop into stop 1
        let times = [(t("0:10"), t("0:05")), (t("0:01"), t("0:02"))];
        assert_eq!(
            validate_times(times),
            Err(ValidationError::NegativeDwellTime { stop_index: 0 })
        );
    }

    #[test]
    fn monitored_flag() {
        assert!(check_monitored(Some(true), false).is_ok());
        assert_eq!(
            check_monitored(Some(false), false),
            Err(ValidationError::NotMonitored)
        );
        assert_eq!(check_monitored(None, false), Err(ValidationError::NotMonitored));
        assert!(check_monitored(Some(false), true).is_ok());
    }

    #[test]
    fn stop_index() {
        assert_eq!(ValidationError::NotMonitored.stop_index(), None);
        assert_eq!(
            ValidationError::NegativeDwellTime { stop_index: 3 }.stop_index(),
            Some(3)
        );
    }
}

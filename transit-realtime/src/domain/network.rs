//! Network entities: agencies, operators, routes and stops.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::FeedScopedId;

/// Transport mode of a route or trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitMode {
    Rail,
    Bus,
    Coach,
    Tram,
    Metro,
    Ferry,
    Air,
}

impl fmt::Display for TransitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitMode::Rail => "RAIL",
            TransitMode::Bus => "BUS",
            TransitMode::Coach => "COACH",
            TransitMode::Tram => "TRAM",
            TransitMode::Metro => "METRO",
            TransitMode::Ferry => "FERRY",
            TransitMode::Air => "AIR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agency {
    pub id: FeedScopedId,
    pub name: String,
}

/// The company actually running the vehicles, as referenced by SIRI
/// `OperatorRef`. May differ from the agency that publishes the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub id: FeedScopedId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: FeedScopedId,
    pub agency: Arc<Agency>,
    pub operator: Option<Arc<Operator>>,
    pub short_name: Option<String>,
    pub mode: TransitMode,
    pub sub_mode: Option<String>,
    /// True for routes that only exist because a real-time message
    /// introduced them.
    pub created_by_realtime: bool,
}

impl Route {
    /// Returns true if the given operator runs this route.
    pub fn is_operated_by(&self, operator_id: &FeedScopedId) -> bool {
        self.operator.as_ref().is_some_and(|o| &o.id == operator_id)
    }
}

/// A boarding location: a platform, quay or bus stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    pub id: FeedScopedId,
    pub name: String,
    /// The station grouping this stop with its sibling quays.
    pub parent_station: Option<FeedScopedId>,
}

impl Stop {
    /// The station this stop belongs to, or the stop itself when it has no
    /// parent.
    pub fn station_id(&self) -> &FeedScopedId {
        self.parent_station.as_ref().unwrap_or(&self.id)
    }

    /// Returns true if both stops are the same or are quays of one station.
    ///
    /// A vehicle moved to a partner stop has changed quay, not route.
    pub fn is_partner_of(&self, other: &Stop) -> bool {
        if self.id == other.id {
            return true;
        }
        match (&self.parent_station, &other.parent_station) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(id: &str, parent: Option<&str>) -> Stop {
        Stop {
            id: FeedScopedId::new("F", id),
            name: id.to_string(),
            parent_station: parent.map(|p| FeedScopedId::new("F", p)),
        }
    }

    #[test]
    fn partner_stops_share_a_station() {
        let b1 = stop("B1", Some("B"));
        let b2 = stop("B2", Some("B"));
        let c1 = stop("C1", Some("C"));
        assert!(b1.is_partner_of(&b2));
        assert!(b1.is_partner_of(&b1));
        assert!(!b1.is_partner_of(&c1));
    }

    #[test]
    fn stops_without_station_are_only_partners_of_themselves() {
        let a = stop("A", None);
        let b = stop("B", None);
        assert!(a.is_partner_of(&a.clone()));
        assert!(!a.is_partner_of(&b));
    }

    #[test]
    fn station_id_falls_back_to_stop() {
        assert_eq!(stop("B1", Some("B")).station_id().id(), "B");
        assert_eq!(stop("A", None).station_id().id(), "A");
    }

    #[test]
    fn route_operated_by() {
        let operator = Arc::new(Operator {
            id: FeedScopedId::new("F", "OP1"),
            name: "Operator".into(),
        });
        let route = Route {
            id: FeedScopedId::new("F", "R1"),
            agency: Arc::new(Agency {
                id: FeedScopedId::new("F", "A1"),
                name: "Agency".into(),
            }),
            operator: Some(operator),
            short_name: None,
            mode: TransitMode::Bus,
            sub_mode: None,
            created_by_realtime: false,
        };
        assert!(route.is_operated_by(&FeedScopedId::new("F", "OP1")));
        assert!(!route.is_operated_by(&FeedScopedId::new("F", "OP2")));
    }

    #[test]
    fn mode_serde_is_lowercase() {
        let mode: TransitMode = serde_json::from_str("\"rail\"").unwrap();
        assert_eq!(mode, TransitMode::Rail);
        assert_eq!(mode.to_string(), "RAIL");
    }
}

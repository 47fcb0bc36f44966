//! Feed-scoped identifiers.
//!
//! Every entity in the transit model belongs to exactly one feed. Ids from
//! different feeds never collide because the feed id is part of the key.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Error returned when parsing an invalid feed-scoped id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid feed-scoped id: {reason}")]
pub struct InvalidFeedScopedId {
    reason: &'static str,
}

/// An entity id qualified by the feed it came from, rendered as `feed:id`.
///
/// # Examples
///
/// ```
/// use transit_realtime::domain::FeedScopedId;
///
/// let id = FeedScopedId::parse("RB:ServiceJourney:1").unwrap();
/// assert_eq!(id.feed_id(), "RB");
/// assert_eq!(id.id(), "ServiceJourney:1");
/// assert_eq!(id.to_string(), "RB:ServiceJourney:1");
///
/// assert!(FeedScopedId::parse("no-separator").is_err());
/// assert!(FeedScopedId::parse(":missing-feed").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedScopedId {
    feed_id: String,
    id: String,
}

impl FeedScopedId {
    pub fn new(feed_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            id: id.into(),
        }
    }

    /// Parse a `feed:id` string. The feed id ends at the first colon; the
    /// local id may itself contain colons.
    pub fn parse(s: &str) -> Result<Self, InvalidFeedScopedId> {
        let (feed_id, id) = s.split_once(':').ok_or(InvalidFeedScopedId {
            reason: "expected feed:id",
        })?;
        if feed_id.is_empty() {
            return Err(InvalidFeedScopedId {
                reason: "feed id must not be empty",
            });
        }
        if id.is_empty() {
            return Err(InvalidFeedScopedId {
                reason: "id must not be empty",
            });
        }
        Ok(Self::new(feed_id, id))
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns true if this id belongs to the given feed.
    pub fn is_in_feed(&self, feed_id: &str) -> bool {
        self.feed_id == feed_id
    }
}

impl fmt::Debug for FeedScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedScopedId({}:{})", self.feed_id, self.id)
    }
}

impl fmt::Display for FeedScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feed_id, self.id)
    }
}

impl TryFrom<String> for FeedScopedId {
    type Error = InvalidFeedScopedId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FeedScopedId> for String {
    fn from(value: FeedScopedId) -> Self {
        value.to_string()
    }
}

/// Key for bookkeeping that applies to one trip on one service date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TripIdAndServiceDate {
    pub trip_id: FeedScopedId,
    pub service_date: NaiveDate,
}

impl TripIdAndServiceDate {
    pub fn new(trip_id: FeedScopedId, service_date: NaiveDate) -> Self {
        Self {
            trip_id,
            service_date,
        }
    }
}

impl fmt::Display for TripIdAndServiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.trip_id, self.service_date)
    }
}

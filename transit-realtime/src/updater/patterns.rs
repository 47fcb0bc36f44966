//! Find-or-create for trip patterns introduced by real-time data.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{FeedScopedId, PatternKey, Route, StopPattern, TripPattern};

/// Real-time patterns indexed by route and stop structure.
///
/// Equal stop patterns on one route always resolve to the same
/// [`TripPattern`], so the number of patterns grows with the number of
/// distinct reroutes rather than with the number of trips rerouted.
#[derive(Debug, Default)]
pub struct TripPatternCache {
    patterns: HashMap<(FeedScopedId, PatternKey), Arc<TripPattern>>,
    counters: HashMap<FeedScopedId, u32>,
}

impl TripPatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pattern for `stop_pattern` on `route`.
    ///
    /// `current` is the pattern the trip runs on now. It is returned as is
    /// when its stops and rules already match. A newly created pattern
    /// records the planned pattern it derives from.
    pub fn resolve(
        &mut self,
        stop_pattern: StopPattern,
        route: &Arc<Route>,
        current: Option<&Arc<TripPattern>>,
    ) -> Arc<TripPattern> {
        if let Some(current) = current {
            if current.route().id == route.id && *current.stop_pattern() == stop_pattern {
                return Arc::clone(current);
            }
        }

        let key = (route.id.clone(), stop_pattern.key());
        if let Some(existing) = self.patterns.get(&key) {
            return Arc::clone(existing);
        }

        let counter = self.counters.entry(route.id.clone()).or_insert(0);
        let id = FeedScopedId::new(route.id.feed_id(), format!("{}:RT{}", route.id.id(), counter));
        *counter += 1;

        let original = current.map(|p| p.original_pattern().unwrap_or(p.id()).clone());
        let pattern = Arc::new(TripPattern::new_realtime(
            id,
            Arc::clone(route),
            stop_pattern,
            original,
        ));
        debug!(pattern = %pattern, route = %route.id, "created real-time trip pattern");
        self.patterns.insert(key, Arc::clone(&pattern));
        pattern
    }

    /// Forget every pattern of routes in the given feed.
    ///
    /// Counters are kept, so ids handed out before the clear are never
    /// reused for a different stop structure.
    pub fn clear_feed(&mut self, feed_id: &str) {
        self.patterns
            .retain(|(route_id, _), _| !route_id.is_in_feed(feed_id));
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

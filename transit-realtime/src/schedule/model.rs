//! Read-only view of the planned schedule.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::domain::{
    Agency, FeedScopedId, Operator, Route, Stop, Trip, TripOnServiceDate, TripPattern,
};

/// The planned network and service, as produced by schedule loading.
///
/// Real-time processing only reads from this model. Entities that exist
/// only in real time live in the snapshot buffer instead.
#[derive(Debug)]
pub struct TransitModel {
    time_zone: Tz,
    agencies: HashMap<FeedScopedId, Arc<Agency>>,
    operators: HashMap<FeedScopedId, Arc<Operator>>,
    routes: HashMap<FeedScopedId, Arc<Route>>,
    stops: HashMap<FeedScopedId, Arc<Stop>>,
    trips: HashMap<FeedScopedId, Arc<Trip>>,
    patterns: HashMap<FeedScopedId, Arc<TripPattern>>,
    pattern_for_trip: HashMap<FeedScopedId, Arc<TripPattern>>,
    trip_on_service_dates: HashMap<FeedScopedId, Arc<TripOnServiceDate>>,
    service_dates: HashMap<FeedScopedId, BTreeSet<NaiveDate>>,
}

impl TransitModel {
    pub fn builder(time_zone: Tz) -> TransitModelBuilder {
        TransitModelBuilder {
            model: TransitModel {
                time_zone,
                agencies: HashMap::new(),
                operators: HashMap::new(),
                routes: HashMap::new(),
                stops: HashMap::new(),
                trips: HashMap::new(),
                patterns: HashMap::new(),
                pattern_for_trip: HashMap::new(),
                trip_on_service_dates: HashMap::new(),
                service_dates: HashMap::new(),
            },
        }
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn agency(&self, id: &FeedScopedId) -> Option<&Arc<Agency>> {
        self.agencies.get(id)
    }

    /// Agencies of a feed, ordered by id.
    pub fn agencies_for_feed(&self, feed_id: &str) -> Vec<&Arc<Agency>> {
        let mut agencies: Vec<_> = self
            .agencies
            .values()
            .filter(|a| a.id.is_in_feed(feed_id))
            .collect();
        agencies.sort_by(|a, b| a.id.cmp(&b.id));
        agencies
    }

    pub fn operator(&self, id: &FeedScopedId) -> Option<&Arc<Operator>> {
        self.operators.get(id)
    }

    pub fn route(&self, id: &FeedScopedId) -> Option<&Arc<Route>> {
        self.routes.get(id)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    pub fn stop(&self, id: &FeedScopedId) -> Option<&Arc<Stop>> {
        self.stops.get(id)
    }

    pub fn trip(&self, id: &FeedScopedId) -> Option<&Arc<Trip>> {
        self.trips.get(id)
    }

    pub fn trips(&self) -> impl Iterator<Item = &Arc<Trip>> {
        self.trips.values()
    }

    pub fn pattern(&self, id: &FeedScopedId) -> Option<&Arc<TripPattern>> {
        self.patterns.get(id)
    }

    pub fn pattern_for_trip(&self, trip_id: &FeedScopedId) -> Option<&Arc<TripPattern>> {
        self.pattern_for_trip.get(trip_id)
    }

    /// Planned patterns of a route, ordered by id.
    pub fn patterns_for_route(&self, route_id: &FeedScopedId) -> Vec<&Arc<TripPattern>> {
        let mut patterns: Vec<_> = self
            .patterns
            .values()
            .filter(|p| &p.route().id == route_id)
            .collect();
        patterns.sort_by(|a, b| a.id().cmp(b.id()));
        patterns
    }

    pub fn trip_on_service_date(&self, id: &FeedScopedId) -> Option<&Arc<TripOnServiceDate>> {
        self.trip_on_service_dates.get(id)
    }

    /// Returns true if the service runs on the date.
    pub fn runs_on(&self, service_id: &FeedScopedId, date: NaiveDate) -> bool {
        self.service_dates
            .get(service_id)
            .is_some_and(|dates| dates.contains(&date))
    }
}

/// Incremental construction of a [`TransitModel`].
///
/// Patterns register the trips of their scheduled timetable, so trips are
/// never added on their own.
pub struct TransitModelBuilder {
    model: TransitModel,
}

impl TransitModelBuilder {
    pub fn agency(mut self, agency: Agency) -> Self {
        self.model.agencies.insert(agency.id.clone(), Arc::new(agency));
        self
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.model
            .operators
            .insert(operator.id.clone(), Arc::new(operator));
        self
    }

    pub fn route(mut self, route: Arc<Route>) -> Self {
        self.model.routes.insert(route.id.clone(), route);
        self
    }

    pub fn stop(mut self, stop: Arc<Stop>) -> Self {
        self.model.stops.insert(stop.id.clone(), stop);
        self
    }

    pub fn pattern(mut self, pattern: TripPattern) -> Self {
        let pattern = Arc::new(pattern);
        for trip_times in pattern.scheduled_timetable().trip_times() {
            let trip = trip_times.trip();
            self.model.trips.insert(trip.id.clone(), Arc::clone(trip));
            self.model
                .pattern_for_trip
                .insert(trip.id.clone(), Arc::clone(&pattern));
        }
        self.model.patterns.insert(pattern.id().clone(), pattern);
        self
    }

    pub fn trip_on_service_date(mut self, dated: TripOnServiceDate) -> Self {
        self.model
            .trip_on_service_dates
            .insert(dated.id.clone(), Arc::new(dated));
        self
    }

    pub fn service_date(mut self, service_id: FeedScopedId, date: NaiveDate) -> Self {
        self.model
            .service_dates
            .entry(service_id)
            .or_default()
            .insert(date);
        self
    }

    pub fn build(self) -> TransitModel {
        self.model
    }
}

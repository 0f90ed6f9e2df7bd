//! Coordination engine facade: wires the pure computation modules to the
//! injected collaborators (document store, notifier, enrichment client,
//! directions provider) and exposes the operation contracts the service
//! layer calls.
//!
//! Everything here is synchronous; the only suspension points are inside the
//! collaborators themselves, each of which carries a bounded timeout and a
//! deterministic fallback where the contract defines one.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::aggregation::{Aggregation, AggregationEngine};
use crate::enrichment::{ClusterSummary, EnrichmentClient};
use crate::error::{CoreError, ResourceKind};
use crate::eta::{Eta, EtaEstimator};
use crate::geo::{self, Coordinate};
use crate::matching::{MatchingEngine, ResponderAssignments};
use crate::model::{Assignment, HelpRequest, NewRequest, RequestStatus, Responder};
use crate::notify::{Notification, Notifier, NullNotifier};
use crate::routing::{Destination, DistanceProvider, RouteOptimizer, RouteResult};
use crate::spatial::SpatialIndex;
use crate::store::{DocumentStore, Repository};
use crate::urgency::urgency_score;

/// Radius for notifying responders about a new request, in km.
const NEW_REQUEST_NOTIFY_RADIUS_KM: f64 = 5.0;

/// Radius for "nearby requests" context lookups, in km.
const CONTEXT_RADIUS_KM: f64 = 2.0;

pub struct CoordinationEngine {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    aggregation: AggregationEngine,
    matching: MatchingEngine,
    eta: Arc<EtaEstimator>,
    optimizer: RouteOptimizer,
    spatial: Mutex<SpatialIndex>,
}

impl CoordinationEngine {
    /// Engine over a document store, with local-only computation (no push
    /// backend, no enrichment, no live directions).
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collaborators(store, Arc::new(NullNotifier), None, None)
    }

    /// Engine with the full collaborator set. `None` collaborators degrade to
    /// the documented deterministic fallbacks.
    pub fn with_collaborators(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        enrichment: Option<Arc<dyn EnrichmentClient>>,
        directions: Option<Arc<dyn DistanceProvider>>,
    ) -> Self {
        let repo = Repository::new(store);

        let mut aggregation = AggregationEngine::new();
        if let Some(client) = enrichment {
            aggregation = aggregation.with_enrichment(client);
        }

        let mut eta = EtaEstimator::new();
        let mut optimizer = RouteOptimizer::new();
        if let Some(provider) = directions {
            eta = eta.with_provider(Box::new(provider.clone()));
            optimizer = optimizer.with_provider(Box::new(provider));
        }
        let eta = Arc::new(eta);

        let matching = MatchingEngine::new(repo.clone(), notifier.clone(), eta.clone());

        Self {
            repo,
            notifier,
            aggregation,
            matching,
            eta,
            optimizer,
            spatial: Mutex::new(SpatialIndex::new()),
        }
    }

    /// Rebuild the spatial index from the store. Call once after attaching
    /// the engine to a store that already holds records.
    pub fn reindex(&self) -> Result<(), CoreError> {
        let mut index = SpatialIndex::new();
        for request in self.repo.all_requests()? {
            if request.status != RequestStatus::Completed {
                index.insert_request(&request.id, request.location);
            }
        }
        for responder in self.repo.all_responders()? {
            if let Some(location) = responder.current_location {
                index.upsert_responder(&responder.id, location);
            }
        }
        if let Ok(mut spatial) = self.spatial.lock() {
            *spatial = index;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Create a help request, index it, and notify nearby available
    /// responders. Notification failures never fail the creation.
    pub fn create_request(&self, new: NewRequest) -> Result<HelpRequest, CoreError> {
        new.validate()?;
        let request = new.into_request(chrono::Utc::now());
        self.repo.put_request(&request)?;

        if let Ok(mut spatial) = self.spatial.lock() {
            spatial.insert_request(&request.id, request.location);
        }

        self.notify_nearby_responders(&request);
        Ok(request)
    }

    fn notify_nearby_responders(&self, request: &HelpRequest) {
        let nearby = match self.nearby_responders(request.location, NEW_REQUEST_NOTIFY_RADIUS_KM) {
            Ok(nearby) => nearby,
            Err(err) => {
                warn!(error = %err, "could not look up responders for new-request notification");
                return;
            }
        };
        let tokens: Vec<String> = nearby
            .iter()
            .filter_map(|(responder, _)| responder.device_token.clone())
            .collect();
        if tokens.is_empty() {
            return;
        }

        let notification = Notification::new(
            "New Rescue Request Nearby",
            format!(
                "Someone needs help at ({:.3}, {:.3})",
                request.location.lat(),
                request.location.lng()
            ),
            serde_json::json!({ "requestId": request.id, "hazard": request.hazard }),
        );
        match self.notifier.send_multicast(&tokens, &notification) {
            Ok(outcome) => debug!(
                delivered = outcome.delivered,
                failed = outcome.failed,
                "notified nearby responders"
            ),
            Err(err) => warn!(error = %err, "new-request multicast failed"),
        }
    }

    pub fn get_request(&self, id: &str) -> Result<HelpRequest, CoreError> {
        self.repo
            .get_request(id)?
            .ok_or_else(|| CoreError::not_found(ResourceKind::Request, id))
    }

    pub fn open_requests(&self) -> Result<Vec<HelpRequest>, CoreError> {
        self.repo.open_requests()
    }

    /// Open requests within `radius_km` of `center`, most urgent first.
    pub fn nearby_requests(
        &self,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<HelpRequest>, CoreError> {
        let mut requests = match self.request_candidates(center, radius_km) {
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(request) = self.repo.get_request(&id)? {
                        found.push(request);
                    }
                }
                found
            }
            // Index unavailable: fall back to a full scan.
            None => self.repo.all_requests()?,
        };

        requests.retain(|r| {
            r.status == RequestStatus::Open
                && geo::distance_km(center, r.location) <= radius_km
        });
        requests.sort_by(|a, b| {
            urgency_score(b)
                .cmp(&urgency_score(a))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(requests)
    }

    fn request_candidates(&self, center: Coordinate, radius_km: f64) -> Option<Vec<String>> {
        self.spatial
            .lock()
            .ok()
            .map(|spatial| spatial.request_candidates(center, radius_km))
    }

    fn responder_candidates(&self, center: Coordinate, radius_km: f64) -> Option<Vec<String>> {
        self.spatial
            .lock()
            .ok()
            .map(|spatial| spatial.responder_candidates(center, radius_km))
    }

    // -----------------------------------------------------------------------
    // Responders
    // -----------------------------------------------------------------------

    pub fn register_responder(&self, responder: Responder) -> Result<Responder, CoreError> {
        if responder.id.trim().is_empty() || responder.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "responder id and name must not be empty".into(),
            ));
        }
        self.repo.put_responder(&responder)?;
        if let (Some(location), Ok(mut spatial)) = (responder.current_location, self.spatial.lock())
        {
            spatial.upsert_responder(&responder.id, location);
        }
        Ok(responder)
    }

    pub fn get_responder(&self, id: &str) -> Result<Responder, CoreError> {
        self.repo
            .get_responder(id)?
            .ok_or_else(|| CoreError::not_found(ResourceKind::Responder, id))
    }

    /// Record a responder location ping.
    pub fn update_responder_location(
        &self,
        responder_id: &str,
        location: Coordinate,
    ) -> Result<(), CoreError> {
        let mut responder = self.get_responder(responder_id)?;
        responder.current_location = Some(location);
        self.repo.put_responder(&responder)?;
        if let Ok(mut spatial) = self.spatial.lock() {
            spatial.upsert_responder(responder_id, location);
        }
        Ok(())
    }

    pub fn set_responder_availability(
        &self,
        responder_id: &str,
        available: bool,
    ) -> Result<(), CoreError> {
        let mut responder = self.get_responder(responder_id)?;
        responder.available = available;
        self.repo.put_responder(&responder)
    }

    /// Available responders within `radius_km` of `center`, closest first,
    /// with their distance in km.
    pub fn nearby_responders(
        &self,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<(Responder, f64)>, CoreError> {
        let responders = match self.responder_candidates(center, radius_km) {
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(responder) = self.repo.get_responder(&id)? {
                        found.push(responder);
                    }
                }
                found
            }
            None => self.repo.all_responders()?,
        };

        let mut nearby: Vec<(Responder, f64)> = responders
            .into_iter()
            .filter(|r| r.available)
            .filter_map(|r| {
                let location = r.current_location?;
                let distance = geo::distance_km(center, location);
                (distance <= radius_km).then_some((r, distance))
            })
            .collect();
        nearby.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(nearby)
    }

    // -----------------------------------------------------------------------
    // Aggregation and enrichment
    // -----------------------------------------------------------------------

    /// Aggregate all open requests into priority clusters.
    pub fn aggregate(&self) -> Result<Aggregation, CoreError> {
        let open = self.repo.open_requests()?;
        Ok(self.aggregation.aggregate(&open))
    }

    /// Analyze one request against its neighbours within 2 km. Passthrough to
    /// the enrichment collaborator; errors when it is unavailable.
    pub fn analyze_context(&self, request_id: &str) -> Result<serde_json::Value, CoreError> {
        let request = self.get_request(request_id)?;
        let mut nearby = self.nearby_requests(request.location, CONTEXT_RADIUS_KM)?;
        nearby.retain(|r| r.id != request.id);
        Ok(self.aggregation.analyze_context(&request, &nearby)?)
    }

    /// Generate a rescue strategy for an explicit cluster of requests.
    pub fn generate_strategy(
        &self,
        request_ids: &[String],
        available_resources: Vec<String>,
    ) -> Result<serde_json::Value, CoreError> {
        if request_ids.is_empty() {
            return Err(CoreError::Validation("request_ids must not be empty".into()));
        }
        let mut requests = Vec::with_capacity(request_ids.len());
        for id in request_ids {
            requests.push(self.get_request(id)?);
        }
        let summary = ClusterSummary::from_requests(&requests, available_resources);
        Ok(self.aggregation.generate_strategy(&summary)?)
    }

    // -----------------------------------------------------------------------
    // Routing and ETA
    // -----------------------------------------------------------------------

    pub fn optimize_route(
        &self,
        origin: Coordinate,
        destinations: &[Destination],
    ) -> RouteResult {
        self.optimizer.optimize(origin, destinations)
    }

    /// Route a rescue team from `origin` through every open request.
    pub fn route_open_requests(&self, origin: Coordinate) -> Result<RouteResult, CoreError> {
        let destinations: Vec<Destination> = self
            .repo
            .open_requests()?
            .into_iter()
            .map(|r| Destination {
                id: Some(r.id),
                location: r.location,
            })
            .collect();
        Ok(self.optimizer.optimize(origin, &destinations))
    }

    pub fn eta(&self, origin: Coordinate, destination: Coordinate) -> Eta {
        self.eta.eta(origin, destination)
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    pub fn match_responder(
        &self,
        request_id: &str,
        responder_id: &str,
    ) -> Result<Assignment, CoreError> {
        self.matching.match_responder(request_id, responder_id)
    }

    pub fn accept_assignment(
        &self,
        assignment_id: &str,
        responder_id: &str,
    ) -> Result<Assignment, CoreError> {
        self.matching.accept_assignment(assignment_id, responder_id)
    }

    /// Complete an assignment; also drops the (now completed) request from
    /// the spatial index.
    pub fn complete_assignment(
        &self,
        assignment_id: &str,
        responder_id: &str,
        notes: Option<String>,
    ) -> Result<Assignment, CoreError> {
        let assignment = self
            .matching
            .complete_assignment(assignment_id, responder_id, notes)?;
        if let Ok(mut spatial) = self.spatial.lock() {
            spatial.remove_request(&assignment.request_id);
        }
        Ok(assignment)
    }

    pub fn responder_assignments(
        &self,
        responder_id: &str,
    ) -> Result<ResponderAssignments, CoreError> {
        self.matching.responder_assignments(responder_id)
    }
}

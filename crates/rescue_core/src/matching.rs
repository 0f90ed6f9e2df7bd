//! Volunteer-to-request matching and the assignment workflow.
//!
//! `match_responder` produces an `assigned` Assignment with an ETA computed
//! from the responder's last known location, persists it, and fires a
//! notification to the responder. Persistence failure is a hard error;
//! notification failure is logged and ignored — the two side effects are
//! independent by design of the contract.
//!
//! The at-most-one-active-assignment-per-request invariant is checked here
//! against the store, but under concurrent matchers the surrounding system
//! must still serialize matches per request (e.g. with a conditional update);
//! this engine does not implement distributed locking.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ConflictError, CoreError, ResourceKind};
use crate::eta::EtaEstimator;
use crate::geo::Coordinate;
use crate::model::{Assignment, HelpRequest, RequestStatus, Responder};
use crate::notify::{Notification, Notifier};
use crate::store::Repository;

/// Sentinel origin used when a responder has never pinged a location.
/// The resulting ETA is a documented degraded estimate, not a crash.
fn unknown_location() -> Coordinate {
    Coordinate::new(0.0, 0.0).expect("sentinel coordinate is valid")
}

/// Split of a responder's assignment history.
#[derive(Debug, Clone, Default)]
pub struct ResponderAssignments {
    pub active: Vec<Assignment>,
    pub completed: Vec<Assignment>,
}

pub struct MatchingEngine {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    eta: Arc<EtaEstimator>,
}

impl MatchingEngine {
    pub fn new(repo: Repository, notifier: Arc<dyn Notifier>, eta: Arc<EtaEstimator>) -> Self {
        Self {
            repo,
            notifier,
            eta,
        }
    }

    fn load_request(&self, id: &str) -> Result<HelpRequest, CoreError> {
        self.repo
            .get_request(id)?
            .ok_or_else(|| CoreError::not_found(ResourceKind::Request, id))
    }

    fn load_responder(&self, id: &str) -> Result<Responder, CoreError> {
        self.repo
            .get_responder(id)?
            .ok_or_else(|| CoreError::not_found(ResourceKind::Responder, id))
    }

    fn load_assignment(&self, id: &str) -> Result<Assignment, CoreError> {
        self.repo
            .get_assignment(id)?
            .ok_or_else(|| CoreError::not_found(ResourceKind::Assignment, id))
    }

    /// Match a responder to a request, producing an `assigned` Assignment.
    ///
    /// Policy for a request that already carries an active assignment:
    /// reject with a conflict — never supersede.
    pub fn match_responder(
        &self,
        request_id: &str,
        responder_id: &str,
    ) -> Result<Assignment, CoreError> {
        let mut request = self.load_request(request_id)?;
        let mut responder = self.load_responder(responder_id)?;

        if let Some(active) = self
            .repo
            .assignments_for_request(request_id)?
            .into_iter()
            .find(Assignment::is_active)
        {
            return Err(ConflictError::RequestAlreadyAssigned {
                request_id: request_id.to_string(),
                assignment_id: active.id,
            }
            .into());
        }
        if request.status == RequestStatus::Completed {
            return Err(CoreError::Validation(format!(
                "request {request_id} is already completed"
            )));
        }

        let origin = responder.current_location.unwrap_or_else(|| {
            debug!(responder_id, "responder location unknown, using sentinel origin");
            unknown_location()
        });
        let eta = self.eta.eta(origin, request.location);

        let assignment = Assignment::new(
            request_id,
            responder_id,
            request.location,
            Some(eta.clone()),
            Utc::now(),
        );

        // Assignment persistence is the hard part of this operation; anything
        // after it succeeding is best-effort bookkeeping or side effects.
        self.repo.put_assignment(&assignment)?;

        request.status = RequestStatus::Assigned;
        request.assigned_responder_id = Some(responder_id.to_string());
        self.repo.put_request(&request)?;

        responder.total_assignments += 1;
        self.repo.put_responder(&responder)?;

        self.notify_responder(&responder, &assignment, eta.distance_km, eta.duration_minutes);

        Ok(assignment)
    }

    fn notify_responder(
        &self,
        responder: &Responder,
        assignment: &Assignment,
        distance_km: f64,
        duration_minutes: u64,
    ) {
        let Some(token) = &responder.device_token else {
            debug!(responder_id = %responder.id, "responder has no notification channel");
            return;
        };
        let notification = Notification::new(
            "New Rescue Assignment",
            format!("Victim {distance_km:.1} km away, ETA {duration_minutes} minutes"),
            json!({
                "assignmentId": assignment.id,
                "requestId": assignment.request_id,
                "distanceKm": distance_km,
                "durationMinutes": duration_minutes,
            }),
        );
        if let Err(err) = self.notifier.send(token, &notification) {
            warn!(responder_id = %responder.id, error = %err, "assignment notification failed");
        }
    }

    /// `assigned -> in_progress`, by the matched responder only. Refreshes
    /// the ETA from the responder's current location.
    pub fn accept_assignment(
        &self,
        assignment_id: &str,
        responder_id: &str,
    ) -> Result<Assignment, CoreError> {
        let mut assignment = self.load_assignment(assignment_id)?;
        assignment.accept(responder_id, Utc::now())?;

        let responder = self.load_responder(responder_id)?;
        if let Some(origin) = responder.current_location {
            assignment.eta = Some(self.eta.eta(origin, assignment.victim_location));
        }

        self.repo.put_assignment(&assignment)?;

        let mut request = self.load_request(&assignment.request_id)?;
        request.status = RequestStatus::InProgress;
        self.repo.put_request(&request)?;

        Ok(assignment)
    }

    /// `in_progress -> completed`. Also completes the linked request and
    /// credits the responder.
    pub fn complete_assignment(
        &self,
        assignment_id: &str,
        responder_id: &str,
        notes: Option<String>,
    ) -> Result<Assignment, CoreError> {
        let mut assignment = self.load_assignment(assignment_id)?;
        assignment.complete(responder_id, notes, Utc::now())?;
        self.repo.put_assignment(&assignment)?;

        let mut request = self.load_request(&assignment.request_id)?;
        request.status = RequestStatus::Completed;
        self.repo.put_request(&request)?;

        let mut responder = self.load_responder(responder_id)?;
        responder.completed_assignments += 1;
        self.repo.put_responder(&responder)?;

        Ok(assignment)
    }

    /// A responder's assignments, split into active and completed.
    pub fn responder_assignments(
        &self,
        responder_id: &str,
    ) -> Result<ResponderAssignments, CoreError> {
        let mut split = ResponderAssignments::default();
        for assignment in self.repo.assignments_for_responder(responder_id)? {
            if assignment.is_active() {
                split.active.push(assignment);
            } else {
                split.completed.push(assignment);
            }
        }
        Ok(split)
    }
}

//! Domain types: help requests, responders, assignments.
//!
//! Requests are never deleted (audit trail); status transitions mutate them in
//! place. Assignments move through a one-way state machine:
//!
//! `assigned --accept--> in_progress --complete--> completed`
//!
//! The transition methods on [`Assignment`] enforce the machine locally; the
//! engine layer adds the cross-record effects (completing the linked request).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConflictError, CoreError};
use crate::eta::Eta;
use crate::geo::Coordinate;

/// Hazard category of a help request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    BuildingCollapse,
    Fire,
    Drowning,
    Earthquake,
    Landslide,
    Flooding,
    Unknown,
}

/// Reported injury severity. Absence means no injuries were reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjuryLevel {
    Critical,
    Severe,
    Moderate,
    Minor,
}

/// Terrain difficulty around the victim, as reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Easy,
    Moderate,
    Difficult,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
}

/// A victim's help request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: String,
    /// Opaque reference to the reporting user.
    pub requester_ref: String,
    pub location: Coordinate,
    pub hazard: HazardKind,
    pub description: String,
    pub people_affected: u32,
    pub injury_level: Option<InjuryLevel>,
    pub accessibility: Accessibility,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    /// Set when a matching operation assigns a responder.
    #[serde(default)]
    pub assigned_responder_id: Option<String>,
}

/// Caller-supplied fields for a new help request; the engine validates and
/// fills in id, status, and timestamp.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub requester_ref: String,
    pub location: Coordinate,
    pub hazard: HazardKind,
    pub description: String,
    pub people_affected: u32,
    pub injury_level: Option<InjuryLevel>,
    pub accessibility: Accessibility,
}

impl NewRequest {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if self.requester_ref.trim().is_empty() {
            return Err(CoreError::Validation(
                "requester_ref must not be empty".into(),
            ));
        }
        if self.people_affected < 1 {
            return Err(CoreError::Validation(
                "people_affected must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_request(self, now: DateTime<Utc>) -> HelpRequest {
        HelpRequest {
            id: Uuid::new_v4().to_string(),
            requester_ref: self.requester_ref,
            location: self.location,
            hazard: self.hazard,
            description: self.description,
            people_affected: self.people_affected,
            injury_level: self.injury_level,
            accessibility: self.accessibility,
            status: RequestStatus::Open,
            created_at: now,
            assigned_responder_id: None,
        }
    }
}

/// A registered responder (volunteer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responder {
    pub id: String,
    pub name: String,
    /// Last known position, updated by periodic pings. `None` until the first
    /// ping arrives.
    pub current_location: Option<Coordinate>,
    pub available: bool,
    /// Maximum distance (km) this responder is willing to travel.
    pub max_distance_km: f64,
    pub total_assignments: u32,
    pub completed_assignments: u32,
    pub rating: f32,
    /// Opaque push-notification token, if the responder has registered one.
    #[serde(default)]
    pub device_token: Option<String>,
}

impl Responder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            current_location: None,
            available: true,
            max_distance_km: 10.0,
            total_assignments: 0,
            completed_assignments: 0,
            rating: 0.0,
            device_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStatus::Assigned => write!(f, "assigned"),
            AssignmentStatus::InProgress => write!(f, "in_progress"),
            AssignmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A responder-to-request assignment produced by the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub request_id: String,
    pub responder_id: String,
    pub victim_location: Coordinate,
    pub eta: Option<Eta>,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-text notes recorded on completion.
    #[serde(default)]
    pub notes: Option<String>,
}

impl Assignment {
    pub fn new(
        request_id: impl Into<String>,
        responder_id: impl Into<String>,
        victim_location: Coordinate,
        eta: Option<Eta>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            responder_id: responder_id.into(),
            victim_location,
            eta,
            status: AssignmentStatus::Assigned,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            notes: None,
        }
    }

    /// Whether this assignment still occupies its request.
    pub fn is_active(&self) -> bool {
        self.status != AssignmentStatus::Completed
    }

    /// `assigned -> in_progress`. Only the matched responder may accept.
    pub fn accept(&mut self, responder_id: &str, now: DateTime<Utc>) -> Result<(), ConflictError> {
        if self.responder_id != responder_id {
            return Err(ConflictError::WrongResponder {
                assignment_id: self.id.clone(),
                expected: self.responder_id.clone(),
                actual: responder_id.to_string(),
            });
        }
        if self.status != AssignmentStatus::Assigned {
            return Err(ConflictError::InvalidTransition {
                from: self.status.to_string(),
                action: "accept".into(),
            });
        }
        self.status = AssignmentStatus::InProgress;
        self.accepted_at = Some(now);
        Ok(())
    }

    /// `in_progress -> completed`. Terminal.
    pub fn complete(
        &mut self,
        responder_id: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ConflictError> {
        if self.responder_id != responder_id {
            return Err(ConflictError::WrongResponder {
                assignment_id: self.id.clone(),
                expected: self.responder_id.clone(),
                actual: responder_id.to_string(),
            });
        }
        if self.status != AssignmentStatus::InProgress {
            return Err(ConflictError::InvalidTransition {
                from: self.status.to_string(),
                action: "complete".into(),
            });
        }
        self.status = AssignmentStatus::Completed;
        self.completed_at = Some(now);
        self.notes = notes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        let location = Coordinate::new(10.0, 20.0).expect("coordinate");
        Assignment::new("req-1", "resp-1", location, None, Utc::now())
    }

    #[test]
    fn accept_then_complete_walks_the_machine() {
        let mut a = assignment();
        a.accept("resp-1", Utc::now()).expect("accept");
        assert_eq!(a.status, AssignmentStatus::InProgress);
        assert!(a.accepted_at.is_some());

        a.complete("resp-1", Some("victim evacuated".into()), Utc::now())
            .expect("complete");
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert!(a.completed_at.is_some());
        assert!(!a.is_active());
    }

    #[test]
    fn accept_by_another_responder_is_rejected() {
        let mut a = assignment();
        let err = a.accept("resp-2", Utc::now()).unwrap_err();
        assert!(matches!(err, ConflictError::WrongResponder { .. }));
        assert_eq!(a.status, AssignmentStatus::Assigned);
    }

    #[test]
    fn complete_requires_in_progress() {
        let mut a = assignment();
        let err = a.complete("resp-1", None, Utc::now()).unwrap_err();
        assert!(matches!(err, ConflictError::InvalidTransition { .. }));
    }

    #[test]
    fn transitions_are_one_way() {
        let mut a = assignment();
        a.accept("resp-1", Utc::now()).expect("accept");
        let err = a.accept("resp-1", Utc::now()).unwrap_err();
        assert!(matches!(err, ConflictError::InvalidTransition { .. }));

        a.complete("resp-1", None, Utc::now()).expect("complete");
        let err = a.complete("resp-1", None, Utc::now()).unwrap_err();
        assert!(matches!(err, ConflictError::InvalidTransition { .. }));
    }

    #[test]
    fn new_request_validation_rejects_bad_input() {
        let location = Coordinate::new(0.0, 0.0).expect("coordinate");
        let req = NewRequest {
            requester_ref: "".into(),
            location,
            hazard: HazardKind::Fire,
            description: "".into(),
            people_affected: 1,
            injury_level: None,
            accessibility: Accessibility::Unknown,
        };
        assert!(req.validate().is_err());

        let req = NewRequest {
            requester_ref: "user-1".into(),
            people_affected: 0,
            ..req
        };
        assert!(req.validate().is_err());
    }
}

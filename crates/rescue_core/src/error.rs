//! Error taxonomy for the coordination engine.
//!
//! Four failure classes, kept distinct so callers can map them to different
//! responses: input validation, not-found, state-machine conflicts, and
//! storage failures. External-collaborator failures (enrichment, directions,
//! notifications) are *not* represented here — wherever a deterministic
//! fallback exists the engine recovers locally and tags the result with its
//! provenance instead of erroring.

use thiserror::Error;

/// The kind of record a not-found error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Request,
    Responder,
    Assignment,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Request => write!(f, "request"),
            ResourceKind::Responder => write!(f, "responder"),
            ResourceKind::Assignment => write!(f, "assignment"),
        }
    }
}

/// State-machine violations. Rejected explicitly, never silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// The request already carries an active (non-completed) assignment.
    #[error("request {request_id} already has an active assignment {assignment_id}")]
    RequestAlreadyAssigned {
        request_id: String,
        assignment_id: String,
    },
    /// A responder other than the matched one tried to act on an assignment.
    #[error("assignment {assignment_id} belongs to responder {expected}, not {actual}")]
    WrongResponder {
        assignment_id: String,
        expected: String,
        actual: String,
    },
    /// A transition was attempted from a state that does not allow it.
    #[error("cannot {action} an assignment in state {from}")]
    InvalidTransition { from: String, action: String },
}

/// Failures of the document-store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored document failed to (de)serialize: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failures of the notification collaborator. Engine operations that treat
/// notification as a side effect log these and carry on.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("responder has no notification channel")]
    NoChannel,
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Failures of the enrichment (text-generation) collaborator.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("no enrichment client configured")]
    Unconfigured,
    #[error("enrichment call timed out")]
    Timeout,
    #[error("enrichment transport error: {0}")]
    Transport(String),
    #[error("enrichment returned an empty response")]
    EmptyResponse,
}

/// Top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

impl CoreError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

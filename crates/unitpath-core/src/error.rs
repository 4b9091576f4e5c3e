//! Error types.
//!
//! Defined in `unitpath-core` so the engine, the backends and the HTTP layer
//! can classify failures (not found, retryable, fault) without string
//! matching.

use thiserror::Error;

use crate::model::ExerciseKind;

/// Why an answer could not be graded. Never surfaced to learners: the
/// evaluator fails closed and counts the answer as incorrect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnswerError {
    /// The exercise has no answer key.
    #[error("exercise {exercise_id} has no correct answer")]
    MissingKey { exercise_id: String },

    /// The answer key does not have the shape its exercise type requires.
    #[error("exercise {exercise_id} has a malformed {kind} answer key: {detail}")]
    MalformedKey {
        exercise_id: String,
        kind: ExerciseKind,
        detail: String,
    },

    /// The submitted answer belongs to a different exercise type.
    #[error("expected a {expected} answer, got {actual}")]
    KindMismatch {
        expected: ExerciseKind,
        actual: ExerciseKind,
    },
}

impl AnswerError {
    /// Whether the problem lies in authored content rather than in the
    /// learner's submission.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            AnswerError::MissingKey { .. } | AnswerError::MalformedKey { .. }
        )
    }
}

/// Errors from the attempt state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The attempt already produced its durable outcome.
    #[error("exercise {0} is already resolved in this attempt")]
    AlreadyResolved(String),
}

/// A progress policy whose thresholds cannot be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// A rate or weight lies outside `[0, 1]`.
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("star_two_rate ({two}) must not exceed star_three_rate ({three})")]
    StarsInverted { two: f64, three: f64 },
}

/// Errors from a progress store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A multi-row write failed and was rolled back.
    #[error("transaction rolled back: {0}")]
    RolledBack(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::RolledBack(_))
    }
}

/// Errors from a content collaborator.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content request timed out after {0}s")]
    Timeout(u64),

    #[error("content service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid content: {0}")]
    Invalid(String),
}

/// Errors surfaced by the learning engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown exercise, unit, track or placement plan.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The request is well-formed JSON but makes no sense for this state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Attempt(#[from] AttemptError),

    /// The server's own eligibility check disagreed with the request.
    #[error("unlock rejected: {0}")]
    UnlockRejected(String),

    /// A batch unlock failed part-way and nothing was applied.
    #[error("batch unlock rolled back, please retry: {0}")]
    UnlockConsistency(#[source] StoreError),

    /// A collaborator call exceeded its timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns `true` if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::UnlockConsistency(_) | EngineError::Timeout { .. } => true,
            EngineError::Store(e) => e.is_transient(),
            EngineError::Content(e) => {
                matches!(e, ContentError::Timeout(_) | ContentError::Network(_))
            }
            _ => false,
        }
    }

    /// Returns `true` for failures that are faults of this service rather
    /// than of the request.
    pub fn is_fault(&self) -> bool {
        match self {
            EngineError::Store(e) => !e.is_transient(),
            EngineError::Content(ContentError::Invalid(_)) => true,
            _ => false,
        }
    }
}

//! Domain errors for the reforge content graph.

use thiserror::Error;

/// Coarse classification used to decide how an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed, empty or failed collaborator response. Retryable.
    TransientGenerationFailure,
    /// A produced artifact would break a graph invariant.
    StructuralViolation,
    /// A requested tree move has no such parent or child.
    NavigationError,
    /// A step or time limit was reached. Normal termination.
    BudgetExhausted,
    /// The orchestrator was asked to do something its current state forbids.
    Lifecycle,
    /// Snapshot encoding or file system failure.
    Persistence,
}

/// Domain-level errors that can occur while building the content graph.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Situation id already exists: {0}")]
    DuplicateId(String),

    #[error("Choice {choice_id} targets unknown situation {target}")]
    UnknownTarget { choice_id: String, target: String },

    #[error("Situation not found: {0}")]
    SituationNotFound(String),

    #[error("Choice {choice_id} not found on situation {situation_id}")]
    ChoiceNotFound {
        situation_id: String,
        choice_id: String,
    },

    #[error("Choice {choice_id} on situation {situation_id} is already resolved")]
    ChoiceAlreadyResolved {
        situation_id: String,
        choice_id: String,
    },

    #[error("Arc not found: {0}")]
    ArcNotFound(String),

    #[error("Arc id already exists: {0}")]
    DuplicateArc(String),

    #[error("Tree node {node} already has a child for choice {choice_id}")]
    DuplicateChild { node: usize, choice_id: String },

    #[error("Current node has no parent")]
    NoParent,

    #[error("No child reached by choice {0}")]
    NoSuchChild(String),

    #[error("Tree node not found: {0}")]
    NodeNotFound(usize),

    #[error("Generation failed: {0}")]
    TransientGenerationFailure(String),

    #[error("Generation rejected: {0}")]
    GenerationRejected(String),

    #[error("{step_name} exhausted after {attempts} attempts: {last_error}")]
    GenerationExhausted {
        step_name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl DomainError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientGenerationFailure(_)
            | Self::GenerationRejected(_)
            | Self::GenerationExhausted { .. } => ErrorCategory::TransientGenerationFailure,
            Self::DuplicateId(_)
            | Self::UnknownTarget { .. }
            | Self::SituationNotFound(_)
            | Self::ChoiceNotFound { .. }
            | Self::ChoiceAlreadyResolved { .. }
            | Self::ArcNotFound(_)
            | Self::DuplicateArc(_)
            | Self::DuplicateChild { .. } => ErrorCategory::StructuralViolation,
            Self::NoParent | Self::NoSuchChild(_) | Self::NodeNotFound(_) => {
                ErrorCategory::NavigationError
            }
            Self::BudgetExhausted(_) => ErrorCategory::BudgetExhausted,
            Self::InvalidStateTransition { .. } => ErrorCategory::Lifecycle,
            Self::SerializationError(_) | Self::PersistenceError(_) => ErrorCategory::Persistence,
        }
    }

    /// Whether a retry of the same call may succeed.
    ///
    /// Only transient collaborator failures qualify; a rejection is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientGenerationFailure(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::PersistenceError(err.to_string())
    }
}

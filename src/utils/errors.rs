//! Error types for the iteration tree and transformation actions.
//!
//! Errors are grouped by the component that produces them. Rejections from
//! the legality oracle are not errors; they are reported through
//! [`ApplyOutcome`](crate::schedule::ApplyOutcome).

use crate::transform::ActionType;
use thiserror::Error;

/// Error raised by tree queries and tree construction.
#[derive(Error, Debug)]
pub enum TreeError {
    /// No computation with this name
    #[error("computation `{0}` not found")]
    ComputationNotFound(String),

    /// No iterator with this name and level
    #[error("iterator {0} not found")]
    IteratorNotFound(String),

    /// The computation's loop nest is shallower than the requested level
    #[error("computation `{computation}` has no iterator at level {level}")]
    LevelNotFound {
        /// Computation that was searched
        computation: String,
        /// Requested level
        level: usize,
    },

    /// The structure violates a tree invariant
    #[error("malformed program structure: {0}")]
    Malformed(String),

    /// The structure could not be deserialized
    #[error("invalid program structure json: {0}")]
    Json(#[from] serde_json::Error),

    /// The structure file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    /// Check if this error means a reference could not be resolved.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TreeError::ComputationNotFound(_)
                | TreeError::IteratorNotFound(_)
                | TreeError::LevelNotFound { .. }
        )
    }
}

/// Error raised by transformation actions.
#[derive(Error, Debug)]
pub enum ActionError {
    /// Wrong parameter arity or types for the action type
    #[error("invalid parameters for {action}: {message}")]
    InvalidParameterShape {
        /// Action being constructed
        action: ActionType,
        /// What was wrong
        message: String,
    },

    /// A parameter or computation could not be resolved against the tree
    #[error(transparent)]
    NotFound(#[from] TreeError),

    /// Representations were requested before binding
    #[error("{0} action has not been bound to a tree")]
    Unbound(ActionType),

    /// The resolved iterators do not have the shape the action needs
    #[error("incompatible iterators for {action}: {message}")]
    IncompatibleIterators {
        /// Action being bound
        action: ActionType,
        /// What was wrong
        message: String,
    },

    /// Applying the action left the snapshot in an invalid state
    #[error("{action} produced an invalid tree: {source}")]
    InvalidResult {
        /// Action being applied
        action: ActionType,
        /// Violated invariant
        source: TreeError,
    },

    /// Text that is neither `name:level` nor an integer
    #[error("cannot parse action parameter `{0}`")]
    UnparsableParameter(String),

    /// Unknown action type name
    #[error("unknown action type `{0}`")]
    UnknownActionType(String),
}

/// Error reported by a compiler backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend failed to process the request
    #[error("backend failure: {0}")]
    Failure(String),

    /// I/O error while talking to the backend
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by a schedule.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// An action could not be bound
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The backend failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Execution was requested for a program the backend rejects
    #[error("schedule is not legal: {0}")]
    Illegal(String),
}

use thiserror::Error;
use uuid::Uuid;

use crate::types::ProspectStatus;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Optimistic-concurrency conflict: the prospect moved underneath a
    /// scheduled action. Recovered locally by skipping the stale action.
    #[error("Stale state for prospect {prospect_id}: expected {expected:?}, found {actual:?}")]
    StaleState {
        prospect_id: Uuid,
        expected: ProspectStatus,
        actual: ProspectStatus,
    },

    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ProspectStatus,
        to: ProspectStatus,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

use thiserror::Error;

use crate::records::TeamId;

/// Failure taxonomy for the forecasting core.
///
/// Absence of rival history is deliberately not represented here: the rival
/// model degrades to its population prior instead of failing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Not enough completed matches to fit a model for `team`. Callers get
    /// the error rather than an unfit estimate.
    #[error("insufficient data for team {team:?}: have {have} matches, need {need}")]
    InsufficientData { team: TeamId, have: usize, need: usize },

    /// Malformed or out-of-domain numeric input, rejected at the boundary of
    /// the component that detected it.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Out-of-range option value. Raised at engine construction, never
    /// mid-run.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Caller-requested early termination. Operations whose partial output is
    /// meaningful (simulation) return the partial result instead of this.
    #[error("cancelled after {completed} completed units")]
    Cancelled { completed: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }
}

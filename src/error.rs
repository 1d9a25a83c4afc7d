//! Error types.
//!
//! Tier-1 infeasibility and timeouts are reported through
//! [`SolutionStatus`](crate::models::SolutionStatus), not through
//! [`SchedulingError`]. Rejected Tier-2 actions are [`ActionError`]s that
//! the environment records and never propagates.

use crate::validation::ValidationError;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, SchedulingError>;

/// Errors surfaced to callers of the engine.
#[derive(thiserror::Error, Debug)]
pub enum SchedulingError {
    #[error("invalid problem: {}", summarize(.0))]
    InvalidProblem(Vec<ValidationError>),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("no active scheduling run")]
    NoActiveRun,

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("unknown machine '{0}'")]
    UnknownMachine(String),

    #[error("environment not ready: {0}")]
    EnvironmentNotReady(String),

    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("invalid action: {0}")]
    InvalidAction(#[from] ActionError),
}

fn summarize(errors: &[ValidationError]) -> String {
    match errors.first() {
        Some(first) => format!("{} issue(s), first: {}", errors.len(), first.message),
        None => "no details".to_string(),
    }
}

/// Why a Tier-2 action could not be applied.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("operation index {0} out of range")]
    OperationOutOfRange(usize),

    #[error("machine index {0} out of range")]
    MachineOutOfRange(usize),

    #[error("slot {0} is empty")]
    EmptySlot(usize),

    #[error("operation {index} is {status}, action requires pending or delayed")]
    InvalidStatus { index: usize, status: &'static str },

    #[error("machine {0} is not available")]
    MachineUnavailable(usize),

    #[error("action leaves state unchanged")]
    NoChange,

    #[error("priority already at cap {0}")]
    PriorityCapped(i32),

    #[error("operation of {duration} minutes is too short to split (minimum {minimum})")]
    TooShortToSplit { duration: i64, minimum: i64 },

    #[error("no free operation slot")]
    NoFreeSlot,

    #[error("no pending successor to merge with")]
    NothingToMerge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationErrorKind;

    #[test]
    fn test_invalid_problem_message() {
        let err = SchedulingError::InvalidProblem(vec![ValidationError {
            kind: ValidationErrorKind::EmptyJob,
            message: "Job 'J1' has no operations".into(),
        }]);
        let msg = err.to_string();
        assert!(msg.contains("1 issue"));
        assert!(msg.contains("J1"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: SchedulingError = parse.unwrap_err().into();
        assert!(matches!(err, SchedulingError::Json(_)));
    }

    #[test]
    fn test_action_error_display() {
        let err = ActionError::TooShortToSplit {
            duration: 20,
            minimum: 30,
        };
        assert!(err.to_string().contains("20"));
        assert_eq!(ActionError::NoFreeSlot.to_string(), "no free operation slot");
    }
}

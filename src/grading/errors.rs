use thiserror::Error;

use crate::grading::model::{OptionId, ProblemId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GradingError {
    /// Backend unreachable or answered with an unexpected status.
    #[error("backend unavailable: {0}")]
    Fetch(String),
    /// Rejected locally before any request was sent, or by the backend's input checks.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Backend refused a structural change, or a confirmed change no longer fits the local tree.
    #[error("conflicting change: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("a feedback change for problem {0} is still pending")]
    MutationPending(ProblemId),
    #[error("invalid edit transition: {0}")]
    InvalidTransition(String),
    #[error("no feedback tree loaded")]
    NotLoaded,
    #[error("unknown feedback option {0}")]
    UnknownOption(OptionId),
}

impl GradingError {
    /// Errors after which local state can no longer be trusted and the tree must be re-fetched.
    pub fn requires_refetch(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Conflict(_) | Self::NotFound(_))
    }
}

/// A successful change revoked the approval of `set_aside_count` solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeWarning {
    pub problem_id: ProblemId,
    pub option_id: OptionId,
    pub set_aside_count: u32,
}

impl std::fmt::Display for CascadeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let noun = if self.set_aside_count == 1 { "solution" } else { "solutions" };
        write!(
            f,
            "{} {noun} set aside after changing feedback option {}; they must be graded again",
            self.set_aside_count, self.option_id
        )
    }
}

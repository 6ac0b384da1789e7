use serde::{Deserialize, Serialize};

use crate::grading::filter::FeedbackPredicate;
use crate::grading::model::{SolutionState, SubmissionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub id: SubmissionId,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub student_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDirection {
    First,
    Prev,
    Current,
    Next,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueQuery {
    /// Submission the move starts from; required for `prev`, `current` and `next`.
    #[serde(default)]
    pub from: Option<SubmissionId>,
    pub direction: QueueDirection,
    #[serde(default)]
    pub predicate: FeedbackPredicate,
    #[serde(default)]
    pub ungraded_only: bool,
}

/// Position of the returned submission within the filtered queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMeta {
    pub no_prev_sub: bool,
    pub no_next_sub: bool,
    pub filter_matches: usize,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionView {
    pub submission: SubmissionSummary,
    pub meta: QueueMeta,
    pub solution: SolutionState,
}

use async_trait::async_trait;

use crate::grading::errors::GradingError;
use crate::grading::model::{FeedbackOption, OptionId, ProblemId, SolutionState, SubmissionId};
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate, TreeSnapshot};
use crate::schemas::solution::SolutionPatch;
use crate::schemas::submission::{QueueQuery, SubmissionSummary, SubmissionView};

/// The grading backend as seen by one grader's session.
///
/// Every call either succeeds with the backend's canonical answer or fails
/// without any local state having been changed.
#[async_trait]
pub trait GradingBackend: Send + Sync {
    async fn fetch_tree(&self, problem_id: ProblemId) -> Result<TreeSnapshot, GradingError>;

    async fn create_option(
        &self,
        problem_id: ProblemId,
        option: NewOption,
    ) -> Result<FeedbackOption, GradingError>;

    async fn update_option(
        &self,
        problem_id: ProblemId,
        option_id: OptionId,
        patch: OptionPatch,
    ) -> Result<OptionUpdate, GradingError>;

    /// Removes the option and its subtree, unchecking them on every solution.
    async fn delete_option(
        &self,
        problem_id: ProblemId,
        option_id: OptionId,
    ) -> Result<(), GradingError>;

    async fn fetch_solution(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
    ) -> Result<SolutionState, GradingError>;

    async fn toggle_option(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        option_id: OptionId,
    ) -> Result<SolutionState, GradingError>;

    async fn update_solution(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        patch: SolutionPatch,
    ) -> Result<SolutionState, GradingError>;

    async fn navigate(
        &self,
        problem_id: ProblemId,
        query: QueueQuery,
    ) -> Result<SubmissionView, GradingError>;

    async fn list_submissions(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<SubmissionSummary>, GradingError>;
}

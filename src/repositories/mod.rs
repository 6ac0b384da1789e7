//! In-memory reference backend: feedback trees, solutions and the submission
//! queue of every problem, behind one lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::grading::errors::GradingError;
use crate::grading::model::{FeedbackOption, OptionId, ProblemId, SolutionState, SubmissionId};
use crate::grading::tree::FeedbackTree;
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate, ProblemCreate, TreeSnapshot};
use crate::schemas::solution::SolutionPatch;
use crate::schemas::submission::{QueueQuery, SubmissionSummary, SubmissionView};
use crate::services::backend::GradingBackend;

pub(crate) mod feedback;
pub(crate) mod solutions;
pub(crate) mod submissions;

#[derive(Debug, Default)]
pub(crate) struct GradingData {
    pub(crate) problems: HashMap<ProblemId, FeedbackTree>,
    pub(crate) submissions: BTreeMap<SubmissionId, SubmissionSummary>,
    pub(crate) solutions: HashMap<(SubmissionId, ProblemId), SolutionState>,
    next_option_id: i64,
}

impl GradingData {
    pub(crate) fn next_option_id(&mut self) -> OptionId {
        self.next_option_id += 1;
        OptionId(self.next_option_id)
    }

    pub(crate) fn tree(&self, problem_id: ProblemId) -> Result<&FeedbackTree, GradingError> {
        self.problems.get(&problem_id).ok_or_else(|| problem_not_found(problem_id))
    }

    pub(crate) fn tree_mut(&mut self, problem_id: ProblemId) -> Result<&mut FeedbackTree, GradingError> {
        self.problems.get_mut(&problem_id).ok_or_else(|| problem_not_found(problem_id))
    }

    pub(crate) fn problem_solutions_mut(
        &mut self,
        problem_id: ProblemId,
    ) -> impl Iterator<Item = &mut SolutionState> {
        self.solutions.values_mut().filter(move |solution| solution.problem_id == problem_id)
    }
}

fn problem_not_found(problem_id: ProblemId) -> GradingError {
    GradingError::NotFound(format!("problem {problem_id}"))
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackRepository {
    data: Arc<RwLock<GradingData>>,
}

impl FeedbackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a problem with an empty feedback tree and returns its root.
    pub async fn create_problem(&self, problem: ProblemCreate) -> Result<FeedbackOption, GradingError> {
        let mut data = self.data.write().await;
        feedback::create_problem(&mut data, problem)
    }

    pub async fn register_submission(
        &self,
        submission: SubmissionSummary,
    ) -> Result<SubmissionSummary, GradingError> {
        let mut data = self.data.write().await;
        submissions::register(&mut data, submission)
    }

    pub async fn problem_count(&self) -> usize {
        self.data.read().await.problems.len()
    }
}

#[async_trait]
impl GradingBackend for FeedbackRepository {
    async fn fetch_tree(&self, problem_id: ProblemId) -> Result<TreeSnapshot, GradingError> {
        let data = self.data.read().await;
        feedback::snapshot(&data, problem_id)
    }

    async fn create_option(
        &self,
        problem_id: ProblemId,
        option: NewOption,
    ) -> Result<FeedbackOption, GradingError> {
        let mut data = self.data.write().await;
        feedback::create_option(&mut data, problem_id, option)
    }

    async fn update_option(
        &self,
        problem_id: ProblemId,
        option_id: OptionId,
        patch: OptionPatch,
    ) -> Result<OptionUpdate, GradingError> {
        let mut data = self.data.write().await;
        feedback::update_option(&mut data, problem_id, option_id, patch)
    }

    async fn delete_option(&self, problem_id: ProblemId, option_id: OptionId) -> Result<(), GradingError> {
        let mut data = self.data.write().await;
        feedback::delete_option(&mut data, problem_id, option_id)
    }

    async fn fetch_solution(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
    ) -> Result<SolutionState, GradingError> {
        let data = self.data.read().await;
        solutions::find(&data, submission_id, problem_id)
    }

    async fn toggle_option(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        option_id: OptionId,
    ) -> Result<SolutionState, GradingError> {
        let mut data = self.data.write().await;
        solutions::toggle(&mut data, submission_id, problem_id, option_id)
    }

    async fn update_solution(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        patch: SolutionPatch,
    ) -> Result<SolutionState, GradingError> {
        let mut data = self.data.write().await;
        solutions::update(&mut data, submission_id, problem_id, patch)
    }

    async fn navigate(&self, problem_id: ProblemId, query: QueueQuery) -> Result<SubmissionView, GradingError> {
        let data = self.data.read().await;
        submissions::navigate(&data, problem_id, query)
    }

    async fn list_submissions(&self, problem_id: ProblemId) -> Result<Vec<SubmissionSummary>, GradingError> {
        let data = self.data.read().await;
        submissions::list(&data, problem_id)
    }
}

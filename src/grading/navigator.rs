use crate::grading::errors::GradingError;
use crate::grading::filter::FeedbackPredicate;
use crate::grading::model::{OptionId, ProblemId, SolutionState, SubmissionId};
use crate::schemas::submission::{QueueDirection, QueueQuery, SubmissionView};
use crate::services::backend::GradingBackend;
use crate::services::search::SubmissionSearch;

/// Walks the submission queue of one problem. Every move loads the target's grading state.
#[derive(Debug, Default)]
pub struct GradingNavigator {
    current: Option<SubmissionView>,
    ungraded_only: bool,
}

impl GradingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&SubmissionView> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<SubmissionId> {
        self.current.as_ref().map(|view| view.submission.id)
    }

    pub fn ungraded_only(&self) -> bool {
        self.ungraded_only
    }

    pub fn set_ungraded_only(&mut self, ungraded_only: bool) {
        self.ungraded_only = ungraded_only;
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Moves are disabled at a boundary and whenever fewer than two submissions match.
    pub fn can_move(&self, direction: QueueDirection) -> bool {
        let Some(view) = &self.current else {
            return matches!(direction, QueueDirection::First | QueueDirection::Last);
        };
        if direction == QueueDirection::Current {
            return true;
        }
        if view.meta.filter_matches < 2 {
            return false;
        }
        match direction {
            QueueDirection::First | QueueDirection::Prev => !view.meta.no_prev_sub,
            QueueDirection::Next | QueueDirection::Last => !view.meta.no_next_sub,
            QueueDirection::Current => true,
        }
    }

    /// Returns `Ok(None)` without contacting the backend when the move is disabled.
    pub async fn step(
        &mut self,
        backend: &dyn GradingBackend,
        problem_id: ProblemId,
        direction: QueueDirection,
        predicate: &FeedbackPredicate,
    ) -> Result<Option<&SubmissionView>, GradingError> {
        if !self.can_move(direction) {
            tracing::debug!(problem_id = %problem_id, ?direction, "Navigation disabled");
            return Ok(None);
        }

        let query = QueueQuery {
            from: self.current_id(),
            direction,
            predicate: predicate.clone(),
            ungraded_only: self.ungraded_only,
        };
        self.load(backend, problem_id, query).await.map(Some)
    }

    pub async fn open(
        &mut self,
        backend: &dyn GradingBackend,
        problem_id: ProblemId,
        submission_id: SubmissionId,
        predicate: &FeedbackPredicate,
    ) -> Result<&SubmissionView, GradingError> {
        let query = QueueQuery {
            from: Some(submission_id),
            direction: QueueDirection::Current,
            predicate: predicate.clone(),
            ungraded_only: self.ungraded_only,
        };
        self.load(backend, problem_id, query).await
    }

    /// Reloads the current submission, e.g. after the filters or the tree changed.
    pub async fn refresh(
        &mut self,
        backend: &dyn GradingBackend,
        problem_id: ProblemId,
        predicate: &FeedbackPredicate,
    ) -> Result<Option<&SubmissionView>, GradingError> {
        match self.current_id() {
            Some(submission_id) => self.open(backend, problem_id, submission_id, predicate).await.map(Some),
            None => Ok(None),
        }
    }

    /// Reloads the current submission under `predicate` and moves to the first match when it
    /// no longer qualifies.
    pub async fn reposition(
        &mut self,
        backend: &dyn GradingBackend,
        problem_id: ProblemId,
        predicate: &FeedbackPredicate,
    ) -> Result<Option<&SubmissionView>, GradingError> {
        let ungraded_only = self.ungraded_only;
        let stays = match self.refresh(backend, problem_id, predicate).await? {
            Some(view) => view.meta.filter_matches == 0 || qualifies(view, predicate, ungraded_only),
            None => return Ok(None),
        };
        if stays {
            return Ok(self.current.as_ref());
        }

        let query = QueueQuery {
            from: self.current_id(),
            direction: QueueDirection::First,
            predicate: predicate.clone(),
            ungraded_only: self.ungraded_only,
        };
        self.load(backend, problem_id, query).await.map(Some)
    }

    /// Opens the best fuzzy match for `query`; does nothing when nothing matches.
    pub async fn jump_to(
        &mut self,
        backend: &dyn GradingBackend,
        search: &dyn SubmissionSearch,
        problem_id: ProblemId,
        query: &str,
        predicate: &FeedbackPredicate,
    ) -> Result<Option<&SubmissionView>, GradingError> {
        let candidates = backend.list_submissions(problem_id).await?;
        let Some(submission_id) = search.best_match(query, &candidates) else {
            tracing::debug!(problem_id = %problem_id, query, "No submission matches search");
            return Ok(None);
        };
        self.open(backend, problem_id, submission_id, predicate).await.map(Some)
    }

    /// Swaps in a solution the backend confirmed for the current submission.
    pub fn replace_solution(&mut self, solution: SolutionState) -> bool {
        match self.current.as_mut() {
            Some(view)
                if view.solution.submission_id == solution.submission_id
                    && view.solution.problem_id == solution.problem_id =>
            {
                view.solution = solution;
                true
            }
            _ => false,
        }
    }

    /// Unchecks options that were just deleted from the tree.
    pub fn forget_options(&mut self, removed: &[OptionId]) {
        if let Some(view) = self.current.as_mut() {
            view.solution.checked_feedback.retain(|id| !removed.contains(id));
        }
    }

    async fn load(
        &mut self,
        backend: &dyn GradingBackend,
        problem_id: ProblemId,
        query: QueueQuery,
    ) -> Result<&SubmissionView, GradingError> {
        let view = backend.navigate(problem_id, query).await?;
        if view.solution.problem_id != problem_id {
            return Err(GradingError::Conflict(format!(
                "requested problem {problem_id}, backend sent {}",
                view.solution.problem_id
            )));
        }

        tracing::debug!(
            problem_id = %problem_id,
            submission_id = %view.submission.id,
            filter_matches = view.meta.filter_matches,
            "Submission loaded"
        );
        Ok(&*self.current.insert(view))
    }
}

fn qualifies(view: &SubmissionView, predicate: &FeedbackPredicate, ungraded_only: bool) -> bool {
    predicate.matches(&view.solution.checked_feedback) && !(ungraded_only && view.solution.is_approved())
}

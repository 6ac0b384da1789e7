//! One grader's session: the feedback tree of the open problem, the edit
//! workflow, the filters and the submission currently on screen.
//!
//! Every operation runs to completion before the next one starts, so the
//! session is the only writer of its tree and solution.

use std::sync::Arc;

use crate::grading::edit::{
    DeletePlan, EditMachine, EditState, MutationCall, MutationOutcome, MutationRequest, MutationResponse,
    OptionDraft,
};
use crate::grading::errors::{CascadeWarning, GradingError};
use crate::grading::filter::{FeedbackPredicate, FilterMode, FilterSet};
use crate::grading::model::{OptionId, ProblemId, SolutionState, SubmissionId};
use crate::grading::navigator::GradingNavigator;
use crate::grading::store::TreeStore;
use crate::grading::tree::FeedbackTree;
use crate::grading::validity::{can_approve, compute_validity, total_score, Validity};
use crate::schemas::solution::SolutionPatch;
use crate::schemas::submission::{QueueDirection, SubmissionView};
use crate::services::backend::GradingBackend;
use crate::services::notifier::{Notice, Notifier, TracingNotifier};
use crate::services::search::{FuzzySubmissionSearch, SubmissionSearch};

/// Result of a confirmed structural change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub removed: Vec<OptionId>,
    pub cascade: Option<CascadeWarning>,
    /// The answer arrived after the grader switched problems and was dropped.
    pub discarded: bool,
}

pub struct GradingSession {
    backend: Arc<dyn GradingBackend>,
    notifier: Arc<dyn Notifier>,
    search: Arc<dyn SubmissionSearch>,
    grader: String,
    store: TreeStore,
    editor: EditMachine,
    filters: Option<FilterSet>,
    navigator: GradingNavigator,
    validity: Option<Validity>,
}

impl GradingSession {
    pub fn new(backend: Arc<dyn GradingBackend>, grader: impl Into<String>) -> Self {
        Self {
            backend,
            notifier: Arc::new(TracingNotifier),
            search: Arc::new(FuzzySubmissionSearch::new()),
            grader: grader.into(),
            store: TreeStore::new(),
            editor: EditMachine::new(),
            filters: None,
            navigator: GradingNavigator::new(),
            validity: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SubmissionSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn grader(&self) -> &str {
        &self.grader
    }

    pub fn problem_id(&self) -> Option<ProblemId> {
        self.store.problem_id()
    }

    pub fn tree(&self) -> Option<&FeedbackTree> {
        self.store.tree()
    }

    pub fn edit_state(&self) -> EditState {
        self.editor.state()
    }

    pub fn filters(&self) -> Option<&FilterSet> {
        self.filters.as_ref()
    }

    pub fn current(&self) -> Option<&SubmissionView> {
        self.navigator.current()
    }

    pub fn solution(&self) -> Option<&SolutionState> {
        self.navigator.current().map(|view| &view.solution)
    }

    pub fn validity(&self) -> Option<&Validity> {
        self.validity.as_ref()
    }

    pub fn can_move(&self, direction: QueueDirection) -> bool {
        self.store.tree().is_some() && self.navigator.can_move(direction)
    }

    pub fn can_approve(&self) -> bool {
        match (self.validity.as_ref(), self.solution()) {
            (Some(validity), Some(solution)) => can_approve(validity, &solution.checked_feedback),
            _ => false,
        }
    }

    pub fn total_score(&self) -> Option<i64> {
        let tree = self.store.tree()?;
        self.solution().map(|solution| total_score(tree, &solution.checked_feedback))
    }

    /// Loads `problem_id`'s tree and starts over with fresh filters.
    ///
    /// The open submission, if any, is reloaded for the new problem.
    pub async fn open_problem(&mut self, problem_id: ProblemId) -> Result<&FeedbackTree, GradingError> {
        if let Err(err) = self.store.load(&*self.backend, problem_id).await {
            self.notifier.notify(Notice::Error(err.clone()));
            return Err(err);
        }
        self.editor.reset();
        self.filters = Some(FilterSet::new(problem_id));

        if let Some(submission_id) = self.navigator.current_id() {
            let predicate = FeedbackPredicate::default();
            if let Err(err) = self.navigator.open(&*self.backend, problem_id, submission_id, &predicate).await {
                self.navigator.clear();
                self.report(err);
            }
        }
        self.recompute_validity();

        tracing::info!(problem_id = %problem_id, grader = %self.grader, "Problem opened");
        self.store.require()
    }

    pub fn begin_add(&mut self, parent: Option<OptionId>) -> Result<OptionId, GradingError> {
        let tree = self.store.require()?;
        self.editor.begin_add(tree, parent)
    }

    pub fn begin_edit(&mut self, node: OptionId) -> Result<OptionDraft, GradingError> {
        let tree = self.store.require()?;
        self.editor.begin_edit(tree, node)
    }

    pub fn cancel_edit(&mut self) -> Result<(), GradingError> {
        let tree = self.store.require()?;
        self.editor.cancel(tree)
    }

    pub async fn save(&mut self, draft: &OptionDraft) -> Result<MutationReport, GradingError> {
        let request = {
            let tree = self.store.require()?;
            self.editor.prepare_save(tree, draft)?
        };
        self.run_mutation(request).await
    }

    pub async fn set_exclusive(
        &mut self,
        node: OptionId,
        exclusive: bool,
    ) -> Result<MutationReport, GradingError> {
        let request = {
            let tree = self.store.require()?;
            self.editor.prepare_exclusive(tree, node, exclusive)?
        };
        self.run_mutation(request).await
    }

    pub fn plan_delete(&self, node: OptionId) -> Result<DeletePlan, GradingError> {
        let tree = self.store.require()?;
        self.editor.plan_delete(tree, node)
    }

    /// Deletes the option being edited together with its subtree.
    pub async fn delete(&mut self, confirmed: bool) -> Result<MutationReport, GradingError> {
        let request = {
            let tree = self.store.require()?;
            self.editor.prepare_delete(tree, confirmed)?
        };
        self.run_mutation(request).await
    }

    /// Transient hover or keyboard highlight; never sent to the backend.
    pub fn highlight(&mut self, option: OptionId, highlight: bool) -> bool {
        if highlight {
            if let Some(tree) = self.store.tree() {
                let others: Vec<OptionId> = tree.options().filter(|o| o.highlight).map(|o| o.id).collect();
                for other in others {
                    self.store.set_highlight(other, false);
                }
            }
        }
        self.store.set_highlight(option, highlight)
    }

    /// Checks or unchecks `option` on the open solution and re-evaluates validity.
    pub async fn toggle_option(&mut self, option: OptionId) -> Result<&Validity, GradingError> {
        let (problem_id, submission_id) = self.grading_target()?;
        let tree = self.store.require()?;
        match tree.get(option) {
            Some(found) if found.is_root() => {
                return Err(GradingError::InvalidTransition("the root option cannot be checked".to_string()));
            }
            Some(_) => {}
            None => return Err(GradingError::UnknownOption(option)),
        }

        let solution = self
            .backend
            .toggle_option(submission_id, problem_id, option)
            .await
            .map_err(|err| self.report(err))?;
        let checked = solution.checked_feedback.contains(&option);
        self.accept_solution(solution)?;
        // Delete confirmation reads `used`; keep it in step with confirmed toggles.
        self.store.record_usage(option, checked);
        self.validity.as_ref().ok_or(GradingError::NotLoaded)
    }

    pub async fn set_remark(&mut self, remark: impl Into<String>) -> Result<&SolutionState, GradingError> {
        let (problem_id, submission_id) = self.grading_target()?;
        let solution = self
            .backend
            .update_solution(submission_id, problem_id, SolutionPatch::remark(remark))
            .await
            .map_err(|err| self.report(err))?;
        self.accept_solution(solution)?;
        self.solution().ok_or(GradingError::NotLoaded)
    }

    /// Approves the open solution in the grader's name.
    ///
    /// Refused locally while the checked set is empty or violates an exclusive group.
    pub async fn approve(&mut self) -> Result<&SolutionState, GradingError> {
        let (problem_id, submission_id) = self.grading_target()?;
        if !self.can_approve() {
            let violations = self.validity.as_ref().map(Validity::violations).unwrap_or_default();
            return Err(GradingError::Validation(if violations.is_empty() {
                "check at least one feedback option before approving".to_string()
            } else {
                let groups: Vec<String> = violations.iter().map(ToString::to_string).collect();
                format!("exclusive options violated: {}", groups.join(", "))
            }));
        }

        let patch = SolutionPatch::approve(self.grader.clone());
        let solution = self
            .backend
            .update_solution(submission_id, problem_id, patch)
            .await
            .map_err(|err| self.report(err))?;
        self.accept_solution(solution)?;
        self.solution().ok_or(GradingError::NotLoaded)
    }

    pub async fn revoke_approval(&mut self) -> Result<&SolutionState, GradingError> {
        let (problem_id, submission_id) = self.grading_target()?;
        let solution = self
            .backend
            .update_solution(submission_id, problem_id, SolutionPatch::revoke())
            .await
            .map_err(|err| self.report(err))?;
        self.accept_solution(solution)?;
        self.solution().ok_or(GradingError::NotLoaded)
    }

    pub async fn first(&mut self) -> Result<Option<&SubmissionView>, GradingError> {
        self.navigate(QueueDirection::First).await
    }

    pub async fn prev(&mut self) -> Result<Option<&SubmissionView>, GradingError> {
        self.navigate(QueueDirection::Prev).await
    }

    pub async fn next(&mut self) -> Result<Option<&SubmissionView>, GradingError> {
        self.navigate(QueueDirection::Next).await
    }

    pub async fn last(&mut self) -> Result<Option<&SubmissionView>, GradingError> {
        self.navigate(QueueDirection::Last).await
    }

    /// `Ok(None)` when the move is disabled; the current submission stays on screen.
    pub async fn navigate(&mut self, direction: QueueDirection) -> Result<Option<&SubmissionView>, GradingError> {
        let problem_id = self.store.require()?.problem_id();
        let predicate = self.predicate();
        let moved = match self.navigator.step(&*self.backend, problem_id, direction, &predicate).await {
            Ok(view) => view.is_some(),
            Err(err) => return Err(self.report(err)),
        };
        self.recompute_validity();
        Ok(if moved { self.navigator.current() } else { None })
    }

    pub async fn open_submission(&mut self, submission_id: SubmissionId) -> Result<&SubmissionView, GradingError> {
        let problem_id = self.store.require()?.problem_id();
        let predicate = self.predicate();
        if let Err(err) = self.navigator.open(&*self.backend, problem_id, submission_id, &predicate).await {
            return Err(self.report(err));
        }
        self.recompute_validity();
        self.navigator.current().ok_or(GradingError::NotLoaded)
    }

    /// Fuzzy search over the problem's submissions; no match leaves everything as it was.
    pub async fn jump_to(&mut self, query: &str) -> Result<Option<&SubmissionView>, GradingError> {
        let problem_id = self.store.require()?.problem_id();
        let predicate = self.predicate();
        let search = Arc::clone(&self.search);
        let moved = match self
            .navigator
            .jump_to(&*self.backend, &*search, problem_id, query, &predicate)
            .await
        {
            Ok(view) => view.is_some(),
            Err(err) => return Err(self.report(err)),
        };
        self.recompute_validity();
        Ok(if moved { self.navigator.current() } else { None })
    }

    /// Applies the toggle-to-clear rule and refreshes the queue position under the new filters.
    pub async fn toggle_filter(&mut self, option: OptionId, mode: FilterMode) -> Result<FilterMode, GradingError> {
        let tree = self.store.require()?;
        if !tree.contains(option) {
            return Err(GradingError::UnknownOption(option));
        }
        let problem_id = tree.problem_id();
        let filters = self.filters.get_or_insert_with(|| FilterSet::new(problem_id));
        let applied = filters.toggle(option, mode);

        self.reposition().await?;
        Ok(applied)
    }

    pub fn ungraded_only(&self) -> bool {
        self.navigator.ungraded_only()
    }

    /// Restricts the queue to submissions without an approved grade.
    pub async fn set_ungraded_only(&mut self, ungraded_only: bool) -> Result<(), GradingError> {
        self.navigator.set_ungraded_only(ungraded_only);
        self.reposition().await
    }

    pub async fn clear_filters(&mut self) -> Result<(), GradingError> {
        if let Some(filters) = self.filters.as_mut() {
            filters.clear();
        }
        self.reposition().await
    }

    /// The grader left the grading view; filters do not survive that.
    pub fn leave_grading_view(&mut self) {
        if let Some(filters) = self.filters.as_mut() {
            filters.clear();
        }
        self.navigator.clear();
        self.validity = None;
    }

    async fn run_mutation(&mut self, request: MutationRequest) -> Result<MutationReport, GradingError> {
        let MutationRequest { ticket, call } = request;
        let response = dispatch(&*self.backend, ticket.problem_id(), call).await;

        match self.editor.complete(&mut self.store, ticket, response)? {
            MutationOutcome::Applied { removed, cascade } => {
                if let Some(warning) = cascade {
                    self.notifier.notify(Notice::Cascade(warning));
                }
                if let (Some(filters), Some(tree)) = (self.filters.as_mut(), self.store.tree()) {
                    filters.prune(tree);
                }
                self.navigator.forget_options(&removed);
                // The backend may have unchecked options or revoked the approval.
                if let Err(err) = self.refresh_current().await {
                    tracing::warn!(error = %err, "Failed to reload solution after feedback change");
                }
                self.recompute_validity();
                Ok(MutationReport { removed, cascade, discarded: false })
            }
            MutationOutcome::Failed(err) => {
                tracing::warn!(
                    problem_id = %ticket.problem_id(),
                    error = %err,
                    "Feedback change rejected; re-fetching tree"
                );
                self.resync().await;
                Err(self.report(err))
            }
            MutationOutcome::Stale => {
                self.resync().await;
                Ok(MutationReport { discarded: true, ..MutationReport::default() })
            }
        }
    }

    /// Re-fetches the open problem's tree after local state went out of sync.
    async fn resync(&mut self) {
        let Some(problem_id) = self.store.problem_id() else {
            return;
        };
        match self.store.load(&*self.backend, problem_id).await {
            Ok(tree) => {
                self.editor.reconcile(tree);
                if let Some(filters) = self.filters.as_mut() {
                    filters.prune(tree);
                }
            }
            Err(err) => {
                self.report(err);
            }
        }
        self.recompute_validity();
    }

    async fn refresh_current(&mut self) -> Result<(), GradingError> {
        let Some(problem_id) = self.store.problem_id() else {
            return Ok(());
        };
        let predicate = self.predicate();
        if let Err(err) = self.navigator.refresh(&*self.backend, problem_id, &predicate).await {
            return Err(self.report(err));
        }
        self.recompute_validity();
        Ok(())
    }

    async fn reposition(&mut self) -> Result<(), GradingError> {
        let Some(problem_id) = self.store.problem_id() else {
            return Ok(());
        };
        let predicate = self.predicate();
        if let Err(err) = self.navigator.reposition(&*self.backend, problem_id, &predicate).await {
            return Err(self.report(err));
        }
        self.recompute_validity();
        Ok(())
    }

    fn accept_solution(&mut self, solution: SolutionState) -> Result<(), GradingError> {
        if !self.navigator.replace_solution(solution) {
            return Err(GradingError::Conflict(
                "backend answered for a different solution".to_string(),
            ));
        }
        self.recompute_validity();
        Ok(())
    }

    fn grading_target(&self) -> Result<(ProblemId, SubmissionId), GradingError> {
        let problem_id = self.store.require()?.problem_id();
        let submission_id = self.navigator.current_id().ok_or(GradingError::NotLoaded)?;
        Ok((problem_id, submission_id))
    }

    fn predicate(&self) -> FeedbackPredicate {
        self.filters.as_ref().map(FilterSet::compose).unwrap_or_default()
    }

    fn recompute_validity(&mut self) {
        self.validity = match (self.store.tree(), self.navigator.current()) {
            (Some(tree), Some(view)) => Some(compute_validity(tree, &view.solution.checked_feedback)),
            _ => None,
        };
    }

    fn report(&self, err: GradingError) -> GradingError {
        self.notifier.notify(Notice::Error(err.clone()));
        err
    }
}

/// Performs the backend call behind a [`MutationRequest`].
///
/// Hosts that drive [`EditMachine`] directly pass the result to
/// [`EditMachine::complete`].
pub async fn dispatch(
    backend: &dyn GradingBackend,
    problem_id: ProblemId,
    call: MutationCall,
) -> Result<MutationResponse, GradingError> {
    match call {
        MutationCall::Create(option) => backend.create_option(problem_id, option).await.map(MutationResponse::Created),
        MutationCall::Update { node, patch } => {
            backend.update_option(problem_id, node, patch).await.map(MutationResponse::Updated)
        }
        MutationCall::Delete(node) => backend.delete_option(problem_id, node).await.map(|()| MutationResponse::Deleted),
    }
}

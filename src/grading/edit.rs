//! Add / edit / delete workflow for feedback options.
//!
//! The machine is synchronous: `prepare_*` validates locally and hands out a
//! [`MutationRequest`] carrying a ticket, the host performs the backend call,
//! and [`EditMachine::complete`] folds the response back into the
//! [`TreeStore`]. Only one ticket may be outstanding per problem.

use std::collections::HashMap;

use crate::grading::errors::{CascadeWarning, GradingError};
use crate::grading::model::{FeedbackOption, OptionId, ProblemId};
use crate::grading::store::TreeStore;
use crate::grading::tree::{FeedbackTree, TreeDelta};
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditState {
    #[default]
    Browsing,
    Adding {
        parent: OptionId,
    },
    Editing {
        node: OptionId,
    },
}

/// Raw form input, validated before any request is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDraft {
    pub name: String,
    pub description: String,
    pub score: String,
}

impl OptionDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>, score: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), score: score.into() }
    }

    pub fn from_option(option: &FeedbackOption) -> Self {
        Self {
            name: option.name.clone(),
            description: option.description.clone().unwrap_or_default(),
            score: option.score.to_string(),
        }
    }

    fn parse(&self) -> Result<ParsedDraft, GradingError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(GradingError::Validation("name must not be empty".to_string()));
        }
        let score = self.score.trim().parse::<i64>().map_err(|_| {
            GradingError::Validation(format!("score '{}' is not an integer", self.score.trim()))
        })?;
        let description = Some(self.description.trim()).filter(|text| !text.is_empty());

        Ok(ParsedDraft {
            name: name.to_string(),
            description: description.map(str::to_string),
            score,
        })
    }
}

struct ParsedDraft {
    name: String,
    description: Option<String>,
    score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create { parent: OptionId },
    Update { node: OptionId },
    Exclusive { node: OptionId, exclusive: bool },
    Delete { node: OptionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationTicket {
    seq: u64,
    problem_id: ProblemId,
    kind: MutationKind,
}

impl MutationTicket {
    pub fn problem_id(&self) -> ProblemId {
        self.problem_id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationCall {
    Create(NewOption),
    Update { node: OptionId, patch: OptionPatch },
    Delete(OptionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub ticket: MutationTicket,
    pub call: MutationCall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationResponse {
    Created(FeedbackOption),
    Updated(OptionUpdate),
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied { removed: Vec<OptionId>, cascade: Option<CascadeWarning> },
    /// The store was not touched; the tree must be re-fetched before continuing.
    Failed(GradingError),
    /// The response belongs to a problem that is no longer loaded and was discarded.
    Stale,
}

/// What a delete would take down with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub node: OptionId,
    pub used: u32,
    pub descendants: usize,
    pub confirmation: Option<String>,
}

impl DeletePlan {
    pub fn needs_confirmation(&self) -> bool {
        self.confirmation.is_some()
    }
}

/// Edit context for the grader's session; the single writer of structural changes.
#[derive(Debug, Default)]
pub struct EditMachine {
    state: EditState,
    pending: HashMap<ProblemId, MutationTicket>,
    next_seq: u64,
}

impl EditMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn is_pending(&self, problem_id: ProblemId) -> bool {
        self.pending.contains_key(&problem_id)
    }

    /// Back to browsing after a problem switch. Tickets of other problems stay tracked.
    pub fn reset(&mut self) {
        self.state = EditState::Browsing;
    }

    pub fn begin_add(
        &mut self,
        tree: &FeedbackTree,
        parent: Option<OptionId>,
    ) -> Result<OptionId, GradingError> {
        self.ensure_browsing(tree)?;
        let parent = parent.unwrap_or_else(|| tree.root_id());
        if !tree.contains(parent) {
            return Err(GradingError::UnknownOption(parent));
        }
        self.state = EditState::Adding { parent };
        Ok(parent)
    }

    pub fn begin_edit(&mut self, tree: &FeedbackTree, node: OptionId) -> Result<OptionDraft, GradingError> {
        self.ensure_browsing(tree)?;
        let option = editable(tree, node)?;
        self.state = EditState::Editing { node };
        Ok(OptionDraft::from_option(option))
    }

    pub fn cancel(&mut self, tree: &FeedbackTree) -> Result<(), GradingError> {
        self.ensure_idle(tree.problem_id())?;
        self.state = EditState::Browsing;
        Ok(())
    }

    pub fn prepare_save(
        &mut self,
        tree: &FeedbackTree,
        draft: &OptionDraft,
    ) -> Result<MutationRequest, GradingError> {
        self.ensure_idle(tree.problem_id())?;
        let parsed = draft.parse()?;

        let (kind, call) = match self.state {
            EditState::Browsing => {
                return Err(GradingError::InvalidTransition(
                    "nothing is being added or edited".to_string(),
                ));
            }
            EditState::Adding { parent } => {
                if !tree.contains(parent) {
                    return Err(GradingError::UnknownOption(parent));
                }
                let option = NewOption {
                    parent_id: parent,
                    name: parsed.name,
                    description: parsed.description,
                    score: parsed.score,
                };
                (MutationKind::Create { parent }, MutationCall::Create(option))
            }
            EditState::Editing { node } => {
                editable(tree, node)?;
                let patch = OptionPatch {
                    name: Some(parsed.name),
                    description: Some(parsed.description.unwrap_or_default()),
                    score: Some(parsed.score),
                    exclusive: None,
                };
                (MutationKind::Update { node }, MutationCall::Update { node, patch })
            }
        };

        Ok(self.issue(tree.problem_id(), kind, call))
    }

    /// Exclusivity is toggled on the parent and does not leave the current state.
    pub fn prepare_exclusive(
        &mut self,
        tree: &FeedbackTree,
        node: OptionId,
        exclusive: bool,
    ) -> Result<MutationRequest, GradingError> {
        self.ensure_idle(tree.problem_id())?;
        let option = tree.get(node).ok_or(GradingError::UnknownOption(node))?;
        if option.exclusive == exclusive {
            return Err(GradingError::InvalidTransition(format!(
                "option {node} already has exclusive = {exclusive}"
            )));
        }

        Ok(self.issue(
            tree.problem_id(),
            MutationKind::Exclusive { node, exclusive },
            MutationCall::Update { node, patch: OptionPatch::exclusive(exclusive) },
        ))
    }

    pub fn plan_delete(&self, tree: &FeedbackTree, node: OptionId) -> Result<DeletePlan, GradingError> {
        let option = editable(tree, node)?;
        let descendants = tree.subtree_ids(node).len().saturating_sub(1);

        let mut reasons = Vec::new();
        if option.used > 0 {
            reasons.push(format!(
                "it is used by {}",
                count(option.used as usize, "solution", "solutions")
            ));
        }
        if descendants > 0 {
            reasons.push(format!(
                "{} will also be deleted",
                count(descendants, "nested option", "nested options")
            ));
        }
        let confirmation = (!reasons.is_empty())
            .then(|| format!("Delete '{}': {}.", option.name, reasons.join("; ")));

        Ok(DeletePlan { node, used: option.used, descendants, confirmation })
    }

    /// Deletes the option being edited. Needs `confirmed` whenever the plan asks for it.
    pub fn prepare_delete(
        &mut self,
        tree: &FeedbackTree,
        confirmed: bool,
    ) -> Result<MutationRequest, GradingError> {
        self.ensure_idle(tree.problem_id())?;
        let EditState::Editing { node } = self.state else {
            return Err(GradingError::InvalidTransition(
                "only the option being edited can be deleted".to_string(),
            ));
        };

        let plan = self.plan_delete(tree, node)?;
        if let Some(confirmation) = plan.confirmation.filter(|_| !confirmed) {
            return Err(GradingError::Validation(format!("confirmation required: {confirmation}")));
        }

        Ok(self.issue(tree.problem_id(), MutationKind::Delete { node }, MutationCall::Delete(node)))
    }

    /// Folds the backend's answer to `ticket` into `store`.
    ///
    /// Only an unknown ticket is an error; backend failures come back as
    /// [`MutationOutcome::Failed`] with the store untouched.
    pub fn complete(
        &mut self,
        store: &mut TreeStore,
        ticket: MutationTicket,
        response: Result<MutationResponse, GradingError>,
    ) -> Result<MutationOutcome, GradingError> {
        if self.pending.get(&ticket.problem_id) != Some(&ticket) {
            return Err(GradingError::InvalidTransition(format!(
                "no pending change #{} for problem {}",
                ticket.seq, ticket.problem_id
            )));
        }
        self.pending.remove(&ticket.problem_id);

        if store.problem_id() != Some(ticket.problem_id) {
            tracing::debug!(
                problem_id = %ticket.problem_id,
                seq = ticket.seq,
                "Discarding feedback change for a problem that is no longer open"
            );
            return Ok(MutationOutcome::Stale);
        }

        let response = match response {
            Ok(response) => response,
            Err(err) => return Ok(MutationOutcome::Failed(err)),
        };

        let (delta, cascade) = match (ticket.kind, response) {
            (MutationKind::Create { parent }, MutationResponse::Created(option))
                if option.parent_id == Some(parent) =>
            {
                (TreeDelta::Created(option), None)
            }
            (
                MutationKind::Update { node } | MutationKind::Exclusive { node, .. },
                MutationResponse::Updated(update),
            ) if update.option.id == node => {
                let cascade = (update.set_aside_count > 0).then_some(CascadeWarning {
                    problem_id: ticket.problem_id,
                    option_id: node,
                    set_aside_count: update.set_aside_count,
                });
                (TreeDelta::Updated(update.option), cascade)
            }
            (MutationKind::Delete { node }, MutationResponse::Deleted) => (TreeDelta::Deleted(node), None),
            (kind, response) => {
                return Ok(MutationOutcome::Failed(GradingError::Conflict(format!(
                    "backend answered {kind:?} with {response:?}"
                ))));
            }
        };

        let removed = match store.apply_delta(delta) {
            Ok(removed) => removed,
            Err(err) => return Ok(MutationOutcome::Failed(err)),
        };

        if !matches!(ticket.kind, MutationKind::Exclusive { .. }) {
            self.state = EditState::Browsing;
        }
        metrics::counter!("feedback_mutations_total", "kind" => kind_label(ticket.kind)).increment(1);
        tracing::info!(
            problem_id = %ticket.problem_id,
            kind = kind_label(ticket.kind),
            removed = removed.len(),
            set_aside = cascade.map(|warning| warning.set_aside_count).unwrap_or_default(),
            "Feedback change applied"
        );

        Ok(MutationOutcome::Applied { removed, cascade })
    }

    /// Drops out of an edit whose target disappeared after a re-fetch.
    pub fn reconcile(&mut self, tree: &FeedbackTree) {
        let target = match self.state {
            EditState::Browsing => return,
            EditState::Adding { parent } => parent,
            EditState::Editing { node } => node,
        };
        if !tree.contains(target) {
            self.state = EditState::Browsing;
        }
    }

    fn issue(&mut self, problem_id: ProblemId, kind: MutationKind, call: MutationCall) -> MutationRequest {
        self.next_seq += 1;
        let ticket = MutationTicket { seq: self.next_seq, problem_id, kind };
        self.pending.insert(problem_id, ticket);
        MutationRequest { ticket, call }
    }

    fn ensure_idle(&self, problem_id: ProblemId) -> Result<(), GradingError> {
        if self.is_pending(problem_id) {
            return Err(GradingError::MutationPending(problem_id));
        }
        Ok(())
    }

    fn ensure_browsing(&self, tree: &FeedbackTree) -> Result<(), GradingError> {
        self.ensure_idle(tree.problem_id())?;
        if self.state != EditState::Browsing {
            return Err(GradingError::InvalidTransition(format!(
                "already {:?}; cancel or save first",
                self.state
            )));
        }
        Ok(())
    }
}

fn editable(tree: &FeedbackTree, node: OptionId) -> Result<&FeedbackOption, GradingError> {
    let option = tree.get(node).ok_or(GradingError::UnknownOption(node))?;
    if option.is_root() {
        return Err(GradingError::InvalidTransition("the root option cannot be edited".to_string()));
    }
    Ok(option)
}

fn kind_label(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::Create { .. } => "create",
        MutationKind::Update { .. } => "update",
        MutationKind::Exclusive { .. } => "exclusive",
        MutationKind::Delete { .. } => "delete",
    }
}

fn count(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("1 {singular}")
    } else {
        format!("{n} {plural}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::tree::tests::{node, tree_of};

    // root(1) -> [A(2) -> [X(3), Y(4)], B(5)]
    fn store() -> TreeStore {
        let mut x = node(3, Some(2), &[]);
        x.used = 2;
        TreeStore::with_tree(tree_of(vec![
            node(1, None, &[2, 5]),
            node(2, Some(1), &[3, 4]),
            x,
            node(4, Some(2), &[]),
            node(5, Some(1), &[]),
        ]))
    }

    fn created(id: i64, parent: i64, name: &str) -> FeedbackOption {
        let mut option = node(id, Some(parent), &[]);
        option.name = name.to_string();
        option
    }

    #[test]
    fn add_defaults_to_root_and_appends_child() {
        let mut store = store();
        let mut machine = EditMachine::new();

        let parent = machine.begin_add(store.require().unwrap(), None).expect("begin add");
        assert_eq!(parent, OptionId(1));
        assert_eq!(machine.state(), EditState::Adding { parent: OptionId(1) });

        let request = machine
            .prepare_save(store.require().unwrap(), &OptionDraft::new("  Units  ", "", "-1"))
            .expect("save");
        let MutationCall::Create(new_option) = &request.call else {
            panic!("expected create, got {:?}", request.call);
        };
        assert_eq!(new_option.name, "Units");
        assert_eq!(new_option.score, -1);
        assert_eq!(new_option.description, None);

        let outcome = machine
            .complete(&mut store, request.ticket, Ok(MutationResponse::Created(created(6, 1, "Units"))))
            .expect("complete");

        assert_eq!(outcome, MutationOutcome::Applied { removed: Vec::new(), cascade: None });
        assert_eq!(machine.state(), EditState::Browsing);
        let tree = store.require().unwrap();
        assert_eq!(tree.root().children, vec![OptionId(2), OptionId(5), OptionId(6)]);
        assert_eq!(tree.get(OptionId(6)).unwrap().index, 5);
    }

    #[test]
    fn local_validation_blocks_request() {
        let store = store();
        let mut machine = EditMachine::new();
        machine.begin_add(store.require().unwrap(), Some(OptionId(2))).unwrap();

        let empty_name = machine.prepare_save(store.require().unwrap(), &OptionDraft::new(" ", "", "1"));
        assert!(matches!(empty_name, Err(GradingError::Validation(_))));

        let bad_score = machine.prepare_save(store.require().unwrap(), &OptionDraft::new("Sign", "", "1.5"));
        assert!(matches!(bad_score, Err(GradingError::Validation(_))));

        assert!(!machine.is_pending(ProblemId(1)));
        assert_eq!(machine.state(), EditState::Adding { parent: OptionId(2) });
    }

    #[test]
    fn edit_replaces_fields_in_place() {
        let mut store = store();
        let mut machine = EditMachine::new();

        let draft = machine.begin_edit(store.require().unwrap(), OptionId(3)).expect("begin edit");
        assert_eq!(draft.name, "option 3");
        assert_eq!(draft.score, "0");

        let request = machine
            .prepare_save(store.require().unwrap(), &OptionDraft::new("Arithmetic slip", "minor", "-2"))
            .expect("save");
        let mut confirmed = created(3, 2, "Arithmetic slip");
        confirmed.score = -2;
        confirmed.description = Some("minor".to_string());
        confirmed.used = 2;
        let outcome = machine
            .complete(
                &mut store,
                request.ticket,
                Ok(MutationResponse::Updated(OptionUpdate { option: confirmed, set_aside_count: 0 })),
            )
            .expect("complete");

        assert!(matches!(outcome, MutationOutcome::Applied { cascade: None, .. }));
        let option = store.require().unwrap().get(OptionId(3)).unwrap();
        assert_eq!(option.name, "Arithmetic slip");
        assert_eq!(option.score, -2);
        assert_eq!(option.index, 2);
        assert_eq!(machine.state(), EditState::Browsing);
    }

    #[test]
    fn second_mutation_rejected_while_one_is_pending() {
        let store = store();
        let mut machine = EditMachine::new();
        let tree = store.require().unwrap();

        let _pending = machine.prepare_exclusive(tree, OptionId(2), true).expect("exclusive");

        assert_eq!(machine.begin_add(tree, None), Err(GradingError::MutationPending(ProblemId(1))));
        assert!(matches!(machine.begin_edit(tree, OptionId(3)), Err(GradingError::MutationPending(_))));
        assert!(matches!(machine.prepare_exclusive(tree, OptionId(5), true), Err(GradingError::MutationPending(_))));
        assert!(matches!(machine.cancel(tree), Err(GradingError::MutationPending(_))));
    }

    #[test]
    fn exclusivity_change_reports_set_aside_count() {
        let mut store = store();
        let mut machine = EditMachine::new();

        let request = machine.prepare_exclusive(store.require().unwrap(), OptionId(2), true).unwrap();
        assert_eq!(
            request.call,
            MutationCall::Update { node: OptionId(2), patch: OptionPatch::exclusive(true) }
        );

        let mut confirmed = node(2, Some(1), &[3, 4]);
        confirmed.exclusive = true;
        let outcome = machine
            .complete(
                &mut store,
                request.ticket,
                Ok(MutationResponse::Updated(OptionUpdate { option: confirmed, set_aside_count: 3 })),
            )
            .unwrap();

        let MutationOutcome::Applied { cascade: Some(warning), .. } = outcome else {
            panic!("expected cascade warning, got {outcome:?}");
        };
        assert_eq!(warning.set_aside_count, 3);
        assert_eq!(warning.option_id, OptionId(2));
        assert!(store.require().unwrap().get(OptionId(2)).unwrap().exclusive);
        assert!(!machine.is_pending(ProblemId(1)));
    }

    #[test]
    fn delete_requires_confirmation_for_used_or_parent_options() {
        let mut store = store();
        let mut machine = EditMachine::new();

        let plan = machine.plan_delete(store.require().unwrap(), OptionId(2)).unwrap();
        assert_eq!(plan.descendants, 2);
        assert_eq!(
            plan.confirmation.as_deref(),
            Some("Delete 'option 2': 2 nested options will also be deleted.")
        );

        let used = machine.plan_delete(store.require().unwrap(), OptionId(3)).unwrap();
        assert_eq!(used.confirmation.as_deref(), Some("Delete 'option 3': it is used by 2 solutions."));
        assert!(!machine.plan_delete(store.require().unwrap(), OptionId(5)).unwrap().needs_confirmation());

        machine.begin_edit(store.require().unwrap(), OptionId(2)).unwrap();
        let unconfirmed = machine.prepare_delete(store.require().unwrap(), false);
        assert!(matches!(unconfirmed, Err(GradingError::Validation(_))));
        assert!(!machine.is_pending(ProblemId(1)));

        let request = machine.prepare_delete(store.require().unwrap(), true).expect("confirmed");
        let outcome = machine.complete(&mut store, request.ticket, Ok(MutationResponse::Deleted)).unwrap();

        assert_eq!(
            outcome,
            MutationOutcome::Applied {
                removed: vec![OptionId(2), OptionId(3), OptionId(4)],
                cascade: None
            }
        );
        assert_eq!(store.require().unwrap().root().children, vec![OptionId(5)]);
        assert_eq!(machine.state(), EditState::Browsing);
    }

    #[test]
    fn failed_mutation_leaves_store_untouched() {
        let mut store = store();
        let mut machine = EditMachine::new();
        machine.begin_edit(store.require().unwrap(), OptionId(5)).unwrap();
        let request = machine.prepare_delete(store.require().unwrap(), false).unwrap();

        let outcome = machine
            .complete(&mut store, request.ticket, Err(GradingError::Conflict("still used".to_string())))
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Failed(GradingError::Conflict("still used".to_string())));
        assert_eq!(store.require().unwrap().len(), 5);
        assert_eq!(machine.state(), EditState::Editing { node: OptionId(5) });
        assert!(!machine.is_pending(ProblemId(1)));
    }

    #[test]
    fn response_for_previous_problem_is_discarded() {
        let mut store = store();
        let mut machine = EditMachine::new();
        machine.begin_add(store.require().unwrap(), None).unwrap();
        let request = machine
            .prepare_save(store.require().unwrap(), &OptionDraft::new("Late", "", "1"))
            .unwrap();

        let mut other = node(10, None, &[]);
        other.name = "__root__".to_string();
        store = TreeStore::with_tree(FeedbackTree::with_root(ProblemId(2), other).unwrap());
        machine.reset();

        let outcome = machine
            .complete(&mut store, request.ticket, Ok(MutationResponse::Created(created(6, 1, "Late"))))
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Stale);
        assert_eq!(store.require().unwrap().len(), 1);
        assert!(!machine.is_pending(ProblemId(1)));
    }

    #[test]
    fn unknown_ticket_is_rejected() {
        let mut store = store();
        let mut machine = EditMachine::new();
        let request = machine.prepare_exclusive(store.require().unwrap(), OptionId(2), true).unwrap();
        machine
            .complete(&mut store, request.ticket, Err(GradingError::Fetch("down".to_string())))
            .unwrap();

        let replay = machine.complete(&mut store, request.ticket, Ok(MutationResponse::Deleted));
        assert!(matches!(replay, Err(GradingError::InvalidTransition(_))));
    }

    #[test]
    fn mismatched_response_is_a_conflict() {
        let mut store = store();
        let mut machine = EditMachine::new();
        machine.begin_add(store.require().unwrap(), Some(OptionId(2))).unwrap();
        let request = machine
            .prepare_save(store.require().unwrap(), &OptionDraft::new("Wrong parent", "", "0"))
            .unwrap();

        let outcome = machine
            .complete(&mut store, request.ticket, Ok(MutationResponse::Created(created(6, 5, "Wrong parent"))))
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Failed(GradingError::Conflict(_))));
        assert!(store.require().unwrap().get(OptionId(6)).is_none());
    }

    #[test]
    fn root_is_not_editable_and_edits_reset_when_target_disappears() {
        let mut store = store();
        let mut machine = EditMachine::new();
        assert!(matches!(
            machine.begin_edit(store.require().unwrap(), OptionId(1)),
            Err(GradingError::InvalidTransition(_))
        ));

        machine.begin_edit(store.require().unwrap(), OptionId(4)).unwrap();
        store.apply_delta(TreeDelta::Deleted(OptionId(2))).unwrap();
        machine.reconcile(store.require().unwrap());
        assert_eq!(machine.state(), EditState::Browsing);
    }
}

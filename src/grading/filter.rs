use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::grading::model::{OptionId, ProblemId};
use crate::grading::tree::FeedbackTree;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    NoFilter,
    Required,
    Excluded,
}

/// Conjunction of "must be checked" and "must not be checked" constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPredicate {
    #[serde(default)]
    pub required: BTreeSet<OptionId>,
    #[serde(default)]
    pub excluded: BTreeSet<OptionId>,
}

impl FeedbackPredicate {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.excluded.is_empty()
    }

    pub fn matches(&self, checked: &BTreeSet<OptionId>) -> bool {
        self.required.is_subset(checked) && self.excluded.is_disjoint(checked)
    }
}

/// Client-side filter annotations for one problem's tree.
///
/// Never persisted; a new set is created whenever the grader opens a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    problem_id: ProblemId,
    modes: BTreeMap<OptionId, FilterMode>,
}

impl FilterSet {
    pub fn new(problem_id: ProblemId) -> Self {
        Self { problem_id, modes: BTreeMap::new() }
    }

    pub fn problem_id(&self) -> ProblemId {
        self.problem_id
    }

    pub fn mode(&self, id: OptionId) -> FilterMode {
        self.modes.get(&id).copied().unwrap_or_default()
    }

    pub fn set(&mut self, id: OptionId, mode: FilterMode) {
        match mode {
            FilterMode::NoFilter => {
                self.modes.remove(&id);
            }
            mode => {
                self.modes.insert(id, mode);
            }
        }
    }

    /// Selecting the active mode again clears it; selecting the other mode replaces it.
    pub fn toggle(&mut self, id: OptionId, mode: FilterMode) -> FilterMode {
        let next = if self.mode(id) == mode { FilterMode::NoFilter } else { mode };
        self.set(id, next);
        next
    }

    pub fn clear(&mut self) {
        self.modes.clear();
    }

    /// Drops annotations on options that are no longer part of the tree.
    pub fn prune(&mut self, tree: &FeedbackTree) {
        self.modes.retain(|id, _| tree.contains(*id));
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn compose(&self) -> FeedbackPredicate {
        let mut predicate = FeedbackPredicate::default();
        for (id, mode) in &self.modes {
            match mode {
                FilterMode::Required => {
                    predicate.required.insert(*id);
                }
                FilterMode::Excluded => {
                    predicate.excluded.insert(*id);
                }
                FilterMode::NoFilter => {}
            }
        }
        predicate
    }
}

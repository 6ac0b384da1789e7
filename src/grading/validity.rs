use std::collections::{BTreeSet, HashMap};

use crate::grading::model::OptionId;
use crate::grading::tree::FeedbackTree;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    /// One entry per exclusive option; `false` when two or more of its children are checked.
    pub valid_by_group: HashMap<OptionId, bool>,
    pub overall_valid: bool,
}

impl Validity {
    pub fn violations(&self) -> Vec<OptionId> {
        let mut violated: Vec<OptionId> = self
            .valid_by_group
            .iter()
            .filter(|(_, valid)| !**valid)
            .map(|(id, _)| *id)
            .collect();
        violated.sort_unstable();
        violated
    }
}

/// Recomputed after every checked-set change and every tree mutation, since exclusivity can flip
/// mid-session.
pub fn compute_validity(tree: &FeedbackTree, checked: &BTreeSet<OptionId>) -> Validity {
    let valid_by_group: HashMap<OptionId, bool> = tree
        .options()
        .filter(|option| option.exclusive)
        .map(|group| {
            let checked_children =
                group.children.iter().filter(|child| checked.contains(child)).count();
            (group.id, checked_children <= 1)
        })
        .collect();
    let overall_valid = valid_by_group.values().all(|valid| *valid);

    Validity { valid_by_group, overall_valid }
}

/// A grade can only be approved when it is valid and at least one option is checked.
pub fn can_approve(validity: &Validity, checked: &BTreeSet<OptionId>) -> bool {
    validity.overall_valid && !checked.is_empty()
}

pub fn total_score(tree: &FeedbackTree, checked: &BTreeSet<OptionId>) -> i64 {
    checked.iter().filter_map(|id| tree.get(*id)).map(|option| option.score).sum()
}

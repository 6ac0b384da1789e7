use std::collections::{HashMap, HashSet};

use crate::grading::errors::GradingError;
use crate::grading::indexer::{self, Shortcut};
use crate::grading::model::{FeedbackOption, OptionId, ProblemId};
use crate::schemas::feedback::TreeSnapshot;

/// A server-confirmed change to a single option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDelta {
    Created(FeedbackOption),
    Updated(FeedbackOption),
    Deleted(OptionId),
}

/// The feedback options of one problem, keyed by id and anchored at a root.
#[derive(Debug, Clone)]
pub struct FeedbackTree {
    problem_id: ProblemId,
    root_id: OptionId,
    nodes: HashMap<OptionId, FeedbackOption>,
}

impl FeedbackTree {
    /// Tree holding only its root.
    pub fn with_root(problem_id: ProblemId, root: FeedbackOption) -> Result<Self, GradingError> {
        let root_id = root.id;
        Self::from_snapshot(TreeSnapshot {
            problem_id,
            root_id,
            options: vec![FeedbackOption { children: Vec::new(), ..root }],
        })
    }

    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self, GradingError> {
        let TreeSnapshot { problem_id, root_id, options } = snapshot;

        let mut nodes = HashMap::with_capacity(options.len());
        for mut option in options {
            option.index = 0;
            option.highlight = false;
            let id = option.id;
            if nodes.insert(id, option).is_some() {
                return Err(malformed(format!("option {id} listed twice")));
            }
        }

        let root = nodes.get(&root_id).ok_or_else(|| malformed(format!("root {root_id} missing")))?;
        if root.parent_id.is_some() {
            return Err(malformed(format!("root {root_id} has a parent")));
        }

        for node in nodes.values() {
            let mut seen = HashSet::with_capacity(node.children.len());
            for child_id in &node.children {
                if !seen.insert(*child_id) {
                    return Err(malformed(format!("{child_id} appears twice under {}", node.id)));
                }
                let child = nodes
                    .get(child_id)
                    .ok_or_else(|| malformed(format!("child {child_id} of {} missing", node.id)))?;
                if child.parent_id != Some(node.id) {
                    return Err(malformed(format!("{child_id} does not point back to {}", node.id)));
                }
            }
            match node.parent_id {
                None if node.id != root_id => {
                    return Err(malformed(format!("second root {}", node.id)));
                }
                Some(parent_id) => {
                    let listed = nodes
                        .get(&parent_id)
                        .is_some_and(|parent| parent.children.contains(&node.id));
                    if !listed {
                        return Err(malformed(format!(
                            "{} is not listed under its parent {parent_id}",
                            node.id
                        )));
                    }
                }
                None => {}
            }
        }

        let mut tree = Self { problem_id, root_id, nodes };
        let indices = indexer::reindex(&tree);
        if indices.len() != tree.nodes.len() {
            return Err(malformed("options unreachable from the root".to_string()));
        }
        tree.write_indices(&indices);
        Ok(tree)
    }

    /// All options in pre-order, the shape the backend serves.
    pub fn to_snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            problem_id: self.problem_id,
            root_id: self.root_id,
            options: self.pre_order().into_iter().cloned().collect(),
        }
    }

    pub fn problem_id(&self) -> ProblemId {
        self.problem_id
    }

    pub fn root_id(&self) -> OptionId {
        self.root_id
    }

    pub fn root(&self) -> &FeedbackOption {
        &self.nodes[&self.root_id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: OptionId) -> Option<&FeedbackOption> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: OptionId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn options(&self) -> impl Iterator<Item = &FeedbackOption> {
        self.nodes.values()
    }

    pub fn children(&self, id: OptionId) -> Vec<&FeedbackOption> {
        self.nodes
            .get(&id)
            .map(|node| node.children.iter().filter_map(|child| self.nodes.get(child)).collect())
            .unwrap_or_default()
    }

    /// `id` followed by all of its descendants, in pre-order.
    pub fn subtree_ids(&self, id: OptionId) -> Vec<OptionId> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            ids.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        ids
    }

    pub fn pre_order(&self) -> Vec<&FeedbackOption> {
        let mut ordered: Vec<&FeedbackOption> = self.nodes.values().collect();
        ordered.sort_by_key(|node| node.index);
        ordered
    }

    /// Options a grader sees, i.e. everything except the root.
    pub fn displayed(&self) -> Vec<&FeedbackOption> {
        self.pre_order().into_iter().filter(|node| !node.is_root()).collect()
    }

    pub fn shortcut(&self, id: OptionId) -> Option<Shortcut> {
        self.nodes.get(&id).map(|node| Shortcut::for_index(node.index))
    }

    /// Displayed options bound to `shortcut`, in pre-order. Shifted keys repeat
    /// every ten options, so more than one can share a key.
    pub fn options_for_shortcut(&self, shortcut: Shortcut) -> Vec<&FeedbackOption> {
        self.displayed()
            .into_iter()
            .filter(|node| Shortcut::for_index(node.index) == shortcut)
            .collect()
    }

    /// Follows a confirmed check or uncheck of `id` on one solution.
    pub fn record_usage(&mut self, id: OptionId, checked: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.used = if checked { node.used.saturating_add(1) } else { node.used.saturating_sub(1) };
                true
            }
            None => false,
        }
    }

    pub fn set_highlight(&mut self, id: OptionId, highlight: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.highlight = highlight;
                true
            }
            None => false,
        }
    }

    pub fn clear_highlights(&mut self) {
        for node in self.nodes.values_mut() {
            node.highlight = false;
        }
    }

    /// Applies a confirmed change in full or not at all, then reindexes.
    ///
    /// Returns the ids removed from the tree, which is empty unless the delta is a delete.
    pub fn apply_delta(&mut self, delta: TreeDelta) -> Result<Vec<OptionId>, GradingError> {
        let removed = match delta {
            TreeDelta::Created(option) => {
                self.check_created(&option)?;
                let id = option.id;
                if let Some(parent) = option.parent_id.and_then(|parent| self.nodes.get_mut(&parent)) {
                    parent.children.push(id);
                }
                self.nodes.insert(id, FeedbackOption { index: 0, highlight: false, ..option });
                Vec::new()
            }
            TreeDelta::Updated(option) => {
                let existing = self
                    .nodes
                    .get_mut(&option.id)
                    .ok_or_else(|| conflict(format!("option {} no longer exists", option.id)))?;
                if existing.parent_id != option.parent_id {
                    return Err(conflict(format!("option {} moved to another parent", option.id)));
                }
                existing.name = option.name;
                existing.description = option.description;
                existing.score = option.score;
                existing.exclusive = option.exclusive;
                existing.used = option.used;
                Vec::new()
            }
            TreeDelta::Deleted(id) => {
                if id == self.root_id {
                    return Err(conflict("the root option cannot be deleted".to_string()));
                }
                let parent_id = self
                    .nodes
                    .get(&id)
                    .ok_or_else(|| conflict(format!("option {id} no longer exists")))?
                    .parent_id;
                let removed = self.subtree_ids(id);
                for removed_id in &removed {
                    self.nodes.remove(removed_id);
                }
                if let Some(parent) = parent_id.and_then(|parent| self.nodes.get_mut(&parent)) {
                    parent.children.retain(|child| *child != id);
                }
                removed
            }
        };

        self.reindex();
        Ok(removed)
    }

    fn check_created(&self, option: &FeedbackOption) -> Result<(), GradingError> {
        if self.nodes.contains_key(&option.id) {
            return Err(conflict(format!("option {} already exists", option.id)));
        }
        if !option.children.is_empty() {
            return Err(conflict(format!("new option {} already has children", option.id)));
        }
        let parent_id = option
            .parent_id
            .ok_or_else(|| conflict(format!("new option {} has no parent", option.id)))?;
        if !self.nodes.contains_key(&parent_id) {
            return Err(conflict(format!("parent {parent_id} no longer exists")));
        }
        Ok(())
    }

    fn reindex(&mut self) {
        let indices = indexer::reindex(self);
        self.write_indices(&indices);
    }

    fn write_indices(&mut self, indices: &HashMap<OptionId, usize>) {
        for (id, node) in &mut self.nodes {
            node.index = indices.get(id).copied().unwrap_or_default();
        }
    }
}

fn malformed(detail: String) -> GradingError {
    GradingError::Conflict(format!("malformed feedback tree: {detail}"))
}

fn conflict(detail: String) -> GradingError {
    GradingError::Conflict(detail)
}

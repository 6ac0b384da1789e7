//! Pre-order indices and the keyboard shortcuts derived from them.
//!
//! Indices are always recomputed for the whole tree. Any structural change can
//! shift every index that follows it, so there is no incremental variant.

use std::collections::HashMap;
use std::fmt;

use crate::grading::model::OptionId;
use crate::grading::tree::FeedbackTree;

/// Indices below this value map to a plain key of the same number.
pub const PLAIN_SHORTCUTS: usize = 11;
const SHIFTED_BANK: usize = 10;

/// Assigns every node reachable from the root its depth-first, parent-before-children rank.
///
/// A node's whole subtree is numbered before its next sibling. The walk uses an
/// explicit stack, so deep trees cannot overflow the call stack.
pub fn reindex(tree: &FeedbackTree) -> HashMap<OptionId, usize> {
    let mut indices = HashMap::with_capacity(tree.len());
    let mut stack = vec![tree.root_id()];

    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        if indices.contains_key(&id) {
            continue;
        }
        indices.insert(id, indices.len());
        stack.extend(node.children.iter().rev().copied());
    }

    indices
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shortcut {
    Plain(u8),
    Shifted(u8),
}

impl Shortcut {
    /// `0..=10` are plain keys; from 11 on a bank of ten shifted keys repeats.
    pub fn for_index(index: usize) -> Self {
        if index < PLAIN_SHORTCUTS {
            Self::Plain(index as u8)
        } else {
            Self::Shifted((index % SHIFTED_BANK) as u8)
        }
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(key) => write!(f, "{key}"),
            Self::Shifted(key) => write!(f, "shift+{key}"),
        }
    }
}

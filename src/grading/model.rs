use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Server-assigned id of a feedback option, unique within its problem.
    OptionId
);
id_type!(ProblemId);
id_type!(SubmissionId);

/// One node of a problem's feedback tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackOption {
    pub id: OptionId,
    /// `None` only for the root, which anchors the tree and is never displayed.
    #[serde(default)]
    pub parent_id: Option<OptionId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub score: i64,
    /// At most one direct child may be checked on a solution when set.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub children: Vec<OptionId>,
    /// Number of solutions currently referencing this option.
    #[serde(default)]
    pub used: u32,
    /// Pre-order rank, derived locally after every structural change.
    #[serde(skip)]
    pub index: usize,
    #[serde(skip)]
    pub highlight: bool,
}

impl FeedbackOption {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Grading state of one submission for one problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionState {
    pub submission_id: SubmissionId,
    pub problem_id: ProblemId,
    #[serde(default)]
    pub checked_feedback: BTreeSet<OptionId>,
    #[serde(default)]
    pub remark: String,
    /// `None` means the grade is not approved, either never or after being set aside.
    #[serde(default)]
    pub graded_by: Option<String>,
    #[serde(default)]
    pub graded_at: Option<String>,
}

impl SolutionState {
    pub fn empty(submission_id: SubmissionId, problem_id: ProblemId) -> Self {
        Self {
            submission_id,
            problem_id,
            checked_feedback: BTreeSet::new(),
            remark: String::new(),
            graded_by: None,
            graded_at: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.graded_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_fields_never_serialized() {
        let option = FeedbackOption {
            id: OptionId(3),
            parent_id: Some(OptionId(1)),
            name: "Sign error".to_string(),
            description: None,
            score: -1,
            exclusive: false,
            children: Vec::new(),
            used: 2,
            index: 7,
            highlight: true,
        };

        let json = serde_json::to_value(&option).expect("serialize");
        assert!(json.get("index").is_none());
        assert!(json.get("highlight").is_none());
        assert_eq!(json["parent_id"], 1);

        let back: FeedbackOption = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.index, 0);
        assert!(!back.highlight);
    }

    #[test]
    fn missing_optional_fields_default() {
        let option: FeedbackOption =
            serde_json::from_str(r#"{"id": 1, "name": "root", "score": 0}"#).expect("parse");
        assert!(option.is_root());
        assert!(option.children.is_empty());
        assert!(!option.exclusive);
    }
}

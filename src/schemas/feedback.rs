use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::grading::model::{FeedbackOption, OptionId, ProblemId};

pub(crate) const DEFAULT_ROOT_NAME: &str = "__root__";

/// Every option of a problem plus the id of its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub problem_id: ProblemId,
    pub root_id: OptionId,
    pub options: Vec<FeedbackOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewOption {
    pub parent_id: OptionId,
    #[validate(length(min = 1, max = 200, message = "name must be 1..200 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub score: i64,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200, message = "name must be 1..200 characters"))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<bool>,
}

impl OptionPatch {
    pub fn exclusive(exclusive: bool) -> Self {
        Self { exclusive: Some(exclusive), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.score.is_none()
            && self.exclusive.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionUpdate {
    pub option: FeedbackOption,
    /// Solutions whose approval was revoked because the change made them invalid.
    #[serde(default)]
    pub set_aside_count: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ProblemCreate {
    pub problem_id: ProblemId,
    #[serde(default = "default_root_name")]
    #[validate(length(min = 1, message = "root_name must not be empty"))]
    pub root_name: String,
}

fn default_root_name() -> String {
    DEFAULT_ROOT_NAME.to_string()
}

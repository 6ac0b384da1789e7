use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::grading::model::OptionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub option_id: OptionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GradeAction {
    Approve { grader: String },
    Revoke,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SolutionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10000, message = "remark must be at most 10000 characters"))]
    pub remark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeAction>,
}

impl SolutionPatch {
    pub fn remark(remark: impl Into<String>) -> Self {
        Self { remark: Some(remark.into()), grade: None }
    }

    pub fn approve(grader: impl Into<String>) -> Self {
        Self { remark: None, grade: Some(GradeAction::Approve { grader: grader.into() }) }
    }

    pub fn revoke() -> Self {
        Self { remark: None, grade: Some(GradeAction::Revoke) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_action_is_tagged() {
        let json = serde_json::to_value(SolutionPatch::approve("alice")).expect("serialize");
        assert_eq!(json, serde_json::json!({"grade": {"action": "approve", "grader": "alice"}}));

        let parsed: SolutionPatch =
            serde_json::from_str(r#"{"grade": {"action": "revoke"}}"#).expect("parse");
        assert_eq!(parsed.grade, Some(GradeAction::Revoke));
    }
}

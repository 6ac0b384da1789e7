use crate::core::time::now_rfc3339;
use crate::grading::errors::GradingError;
use crate::grading::model::{OptionId, ProblemId, SolutionState, SubmissionId};
use crate::grading::validity::{can_approve, compute_validity};
use crate::repositories::feedback::option_not_found;
use crate::repositories::GradingData;
use crate::schemas::solution::{GradeAction, SolutionPatch};

/// Stored solution, or an empty one when the submission was never graded for this problem.
pub(crate) fn find(
    data: &GradingData,
    submission_id: SubmissionId,
    problem_id: ProblemId,
) -> Result<SolutionState, GradingError> {
    ensure_known(data, submission_id, problem_id)?;
    Ok(data
        .solutions
        .get(&(submission_id, problem_id))
        .cloned()
        .unwrap_or_else(|| SolutionState::empty(submission_id, problem_id)))
}

/// Flips one option; an approved grade is revoked when the result is no longer approvable.
pub(crate) fn toggle(
    data: &mut GradingData,
    submission_id: SubmissionId,
    problem_id: ProblemId,
    option_id: OptionId,
) -> Result<SolutionState, GradingError> {
    ensure_known(data, submission_id, problem_id)?;
    let tree = data.tree(problem_id)?;
    match tree.get(option_id) {
        Some(option) if option.is_root() => {
            return Err(GradingError::Validation("the root option cannot be checked".to_string()));
        }
        Some(_) => {}
        None => return Err(option_not_found(option_id)),
    }

    let mut solution = find(data, submission_id, problem_id)?;
    if !solution.checked_feedback.remove(&option_id) {
        solution.checked_feedback.insert(option_id);
    }
    if solution.is_approved() {
        let validity = compute_validity(tree, &solution.checked_feedback);
        if !can_approve(&validity, &solution.checked_feedback) {
            solution.graded_by = None;
            solution.graded_at = None;
            tracing::info!(
                submission_id = %submission_id,
                problem_id = %problem_id,
                "Approval revoked by feedback toggle"
            );
        }
    }

    data.solutions.insert((submission_id, problem_id), solution.clone());
    Ok(solution)
}

pub(crate) fn update(
    data: &mut GradingData,
    submission_id: SubmissionId,
    problem_id: ProblemId,
    patch: SolutionPatch,
) -> Result<SolutionState, GradingError> {
    let mut solution = find(data, submission_id, problem_id)?;
    if let Some(remark) = patch.remark {
        solution.remark = remark;
    }

    match patch.grade {
        Some(GradeAction::Approve { grader }) => {
            let grader = grader.trim();
            if grader.is_empty() {
                return Err(GradingError::Validation("grader must not be empty".to_string()));
            }
            let validity = compute_validity(data.tree(problem_id)?, &solution.checked_feedback);
            if !can_approve(&validity, &solution.checked_feedback) {
                return Err(GradingError::Validation(
                    "only a valid, non-empty grade can be approved".to_string(),
                ));
            }
            solution.graded_by = Some(grader.to_string());
            solution.graded_at = Some(now_rfc3339());
            tracing::info!(submission_id = %submission_id, problem_id = %problem_id, grader, "Grade approved");
        }
        Some(GradeAction::Revoke) => {
            solution.graded_by = None;
            solution.graded_at = None;
        }
        None => {}
    }

    data.solutions.insert((submission_id, problem_id), solution.clone());
    Ok(solution)
}

fn ensure_known(
    data: &GradingData,
    submission_id: SubmissionId,
    problem_id: ProblemId,
) -> Result<(), GradingError> {
    data.tree(problem_id)?;
    if !data.submissions.contains_key(&submission_id) {
        return Err(GradingError::NotFound(format!("submission {submission_id}")));
    }
    Ok(())
}

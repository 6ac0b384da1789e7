use crate::grading::errors::GradingError;
use crate::grading::model::{ProblemId, SolutionState, SubmissionId};
use crate::repositories::GradingData;
use crate::schemas::submission::{QueueDirection, QueueMeta, QueueQuery, SubmissionSummary, SubmissionView};

pub(crate) fn register(
    data: &mut GradingData,
    submission: SubmissionSummary,
) -> Result<SubmissionSummary, GradingError> {
    if data.submissions.contains_key(&submission.id) {
        return Err(GradingError::Conflict(format!("submission {} already exists", submission.id)));
    }
    tracing::info!(submission_id = %submission.id, "Submission registered");
    data.submissions.insert(submission.id, submission.clone());
    Ok(submission)
}

pub(crate) fn list(data: &GradingData, problem_id: ProblemId) -> Result<Vec<SubmissionSummary>, GradingError> {
    data.tree(problem_id)?;
    Ok(data.submissions.values().cloned().collect())
}

/// Resolves one queue move. The queue is ordered by submission id; a move with
/// no target in its direction stays on `from`.
pub(crate) fn navigate(
    data: &GradingData,
    problem_id: ProblemId,
    query: QueueQuery,
) -> Result<SubmissionView, GradingError> {
    data.tree(problem_id)?;

    let matches: Vec<SubmissionId> = data
        .submissions
        .keys()
        .copied()
        .filter(|id| {
            let solution = solution_or_empty(data, *id, problem_id);
            query.predicate.matches(&solution.checked_feedback)
                && !(query.ungraded_only && solution.is_approved())
        })
        .collect();

    let from = query.from;
    let target = match query.direction {
        QueueDirection::First => matches.first().copied().or(from),
        QueueDirection::Last => matches.last().copied().or(from),
        QueueDirection::Next => {
            let from = require_from(from, query.direction)?;
            Some(matches.iter().copied().find(|id| *id > from).unwrap_or(from))
        }
        QueueDirection::Prev => {
            let from = require_from(from, query.direction)?;
            Some(matches.iter().rev().copied().find(|id| *id < from).unwrap_or(from))
        }
        QueueDirection::Current => Some(require_from(from, query.direction)?),
    };
    let target = target.ok_or_else(|| GradingError::NotFound("no submission matches the filters".to_string()))?;
    let submission = data
        .submissions
        .get(&target)
        .cloned()
        .ok_or_else(|| GradingError::NotFound(format!("submission {target}")))?;

    let meta = QueueMeta {
        no_prev_sub: !matches.iter().any(|id| *id < target),
        no_next_sub: !matches.iter().any(|id| *id > target),
        filter_matches: matches.len(),
        total: data.submissions.len(),
    };
    tracing::debug!(
        problem_id = %problem_id,
        direction = ?query.direction,
        submission_id = %target,
        filter_matches = meta.filter_matches,
        "Queue move resolved"
    );

    Ok(SubmissionView { submission, meta, solution: solution_or_empty(data, target, problem_id) })
}

fn solution_or_empty(data: &GradingData, submission_id: SubmissionId, problem_id: ProblemId) -> SolutionState {
    data.solutions
        .get(&(submission_id, problem_id))
        .cloned()
        .unwrap_or_else(|| SolutionState::empty(submission_id, problem_id))
}

fn require_from(from: Option<SubmissionId>, direction: QueueDirection) -> Result<SubmissionId, GradingError> {
    from.ok_or_else(|| GradingError::Validation(format!("{direction:?} needs a starting submission")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::filter::FeedbackPredicate;
    use crate::grading::model::OptionId;
    use crate::repositories::feedback::create_problem;
    use crate::schemas::feedback::ProblemCreate;

    const PROBLEM: ProblemId = ProblemId(1);

    fn data_with(ids: &[i64]) -> GradingData {
        let mut data = GradingData::default();
        create_problem(&mut data, ProblemCreate { problem_id: PROBLEM, root_name: "root".into() }).expect("problem");
        for id in ids {
            register(&mut data, SubmissionSummary { id: SubmissionId(*id), student_id: None, student_name: None })
                .expect("register");
        }
        data
    }

    fn query(from: Option<i64>, direction: QueueDirection) -> QueueQuery {
        QueueQuery {
            from: from.map(SubmissionId),
            direction,
            predicate: FeedbackPredicate::default(),
            ungraded_only: false,
        }
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut data = data_with(&[1]);
        let err = register(&mut data, SubmissionSummary { id: SubmissionId(1), student_id: None, student_name: None })
            .unwrap_err();
        assert!(matches!(err, GradingError::Conflict(_)));
    }

    #[test]
    fn moves_follow_id_order_and_flag_boundaries() {
        let data = data_with(&[30, 10, 20]);

        let first = navigate(&data, PROBLEM, query(None, QueueDirection::First)).expect("first");
        assert_eq!(first.submission.id, SubmissionId(10));
        assert!(first.meta.no_prev_sub);
        assert!(!first.meta.no_next_sub);
        assert_eq!(first.meta.total, 3);

        let next = navigate(&data, PROBLEM, query(Some(10), QueueDirection::Next)).expect("next");
        assert_eq!(next.submission.id, SubmissionId(20));

        let past_end = navigate(&data, PROBLEM, query(Some(30), QueueDirection::Next)).expect("stay");
        assert_eq!(past_end.submission.id, SubmissionId(30));
        assert!(past_end.meta.no_next_sub);
    }

    #[test]
    fn predicate_limits_matches() {
        let mut data = data_with(&[1, 2, 3]);
        let mut checked = SolutionState::empty(SubmissionId(2), PROBLEM);
        checked.checked_feedback.insert(OptionId(5));
        data.solutions.insert((SubmissionId(2), PROBLEM), checked);

        let mut filtered = query(Some(1), QueueDirection::Next);
        filtered.predicate.required.insert(OptionId(5));
        let view = navigate(&data, PROBLEM, filtered).expect("next");

        assert_eq!(view.submission.id, SubmissionId(2));
        assert_eq!(view.meta.filter_matches, 1);
        assert!(view.meta.no_prev_sub && view.meta.no_next_sub);
    }

    #[test]
    fn relative_moves_need_a_start() {
        let data = data_with(&[1]);
        let err = navigate(&data, PROBLEM, query(None, QueueDirection::Next)).unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        let empty = data_with(&[]);
        let err = navigate(&empty, PROBLEM, query(None, QueueDirection::First)).unwrap_err();
        assert!(matches!(err, GradingError::NotFound(_)));
    }
}

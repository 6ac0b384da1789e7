use crate::grading::errors::GradingError;
use crate::grading::model::{FeedbackOption, OptionId, ProblemId};
use crate::grading::tree::{FeedbackTree, TreeDelta};
use crate::repositories::GradingData;
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate, ProblemCreate, TreeSnapshot};

pub(crate) fn create_problem(
    data: &mut GradingData,
    problem: ProblemCreate,
) -> Result<FeedbackOption, GradingError> {
    if data.problems.contains_key(&problem.problem_id) {
        return Err(GradingError::Conflict(format!("problem {} already exists", problem.problem_id)));
    }
    let root_name = required_name(&problem.root_name)?;

    let root = FeedbackOption {
        id: data.next_option_id(),
        parent_id: None,
        name: root_name,
        description: None,
        score: 0,
        exclusive: false,
        children: Vec::new(),
        used: 0,
        index: 0,
        highlight: false,
    };
    let tree = FeedbackTree::with_root(problem.problem_id, root.clone())?;
    data.problems.insert(problem.problem_id, tree);

    tracing::info!(problem_id = %problem.problem_id, root_id = %root.id, "Problem created");
    Ok(root)
}

/// Current tree with usage counts filled in.
pub(crate) fn snapshot(data: &GradingData, problem_id: ProblemId) -> Result<TreeSnapshot, GradingError> {
    let tree = data.tree(problem_id)?;
    let mut snapshot = tree.to_snapshot();
    for option in &mut snapshot.options {
        option.used = used_count(data, problem_id, option.id);
    }
    Ok(snapshot)
}

pub(crate) fn create_option(
    data: &mut GradingData,
    problem_id: ProblemId,
    option: NewOption,
) -> Result<FeedbackOption, GradingError> {
    let name = required_name(&option.name)?;
    if !data.tree(problem_id)?.contains(option.parent_id) {
        return Err(option_not_found(option.parent_id));
    }

    let id = data.next_option_id();
    let created = FeedbackOption {
        id,
        parent_id: Some(option.parent_id),
        name,
        description: option.description.filter(|text| !text.trim().is_empty()),
        score: option.score,
        exclusive: false,
        children: Vec::new(),
        used: 0,
        index: 0,
        highlight: false,
    };
    let tree = data.tree_mut(problem_id)?;
    tree.apply_delta(TreeDelta::Created(created))?;

    tracing::info!(problem_id = %problem_id, option_id = %id, parent_id = %option.parent_id, "Feedback option created");
    with_usage(data, problem_id, id)
}

/// Applies `patch` and revokes the approval of every solution the change makes invalid.
pub(crate) fn update_option(
    data: &mut GradingData,
    problem_id: ProblemId,
    option_id: OptionId,
    patch: OptionPatch,
) -> Result<OptionUpdate, GradingError> {
    if patch.is_empty() {
        return Err(GradingError::Validation("nothing to update".to_string()));
    }
    let current = data.tree(problem_id)?.get(option_id).ok_or_else(|| option_not_found(option_id))?;

    let mut updated = current.clone();
    if let Some(name) = &patch.name {
        updated.name = required_name(name)?;
    }
    if let Some(description) = patch.description {
        updated.description = Some(description).filter(|text| !text.trim().is_empty());
    }
    if let Some(score) = patch.score {
        updated.score = score;
    }
    if let Some(exclusive) = patch.exclusive {
        updated.exclusive = exclusive;
    }
    let became_exclusive = updated.exclusive && !current.exclusive;

    data.tree_mut(problem_id)?.apply_delta(TreeDelta::Updated(updated))?;

    let set_aside_count = if became_exclusive { set_aside_conflicting(data, problem_id, option_id)? } else { 0 };
    if set_aside_count > 0 {
        metrics::counter!("solutions_set_aside_total").increment(u64::from(set_aside_count));
        tracing::warn!(
            problem_id = %problem_id,
            option_id = %option_id,
            set_aside = set_aside_count,
            "Solutions set aside by exclusivity change"
        );
    }

    tracing::info!(problem_id = %problem_id, option_id = %option_id, "Feedback option updated");
    Ok(OptionUpdate { option: with_usage(data, problem_id, option_id)?, set_aside_count })
}

/// Removes the option with its subtree and unchecks all of it on every solution.
pub(crate) fn delete_option(
    data: &mut GradingData,
    problem_id: ProblemId,
    option_id: OptionId,
) -> Result<(), GradingError> {
    let tree = data.tree_mut(problem_id)?;
    match tree.get(option_id) {
        Some(option) if option.is_root() => {
            return Err(GradingError::Conflict("the root option cannot be deleted".to_string()));
        }
        Some(_) => {}
        None => return Err(option_not_found(option_id)),
    }
    let removed = tree.apply_delta(TreeDelta::Deleted(option_id))?;

    let mut emptied = 0u32;
    for solution in data.problem_solutions_mut(problem_id) {
        solution.checked_feedback.retain(|id| !removed.contains(id));
        if solution.checked_feedback.is_empty() && solution.is_approved() {
            solution.graded_by = None;
            solution.graded_at = None;
            emptied += 1;
        }
    }
    if emptied > 0 {
        metrics::counter!("solutions_set_aside_total").increment(u64::from(emptied));
    }

    tracing::info!(
        problem_id = %problem_id,
        option_id = %option_id,
        removed = removed.len(),
        set_aside = emptied,
        "Feedback option deleted"
    );
    Ok(())
}

pub(crate) fn used_count(data: &GradingData, problem_id: ProblemId, option_id: OptionId) -> u32 {
    let used = data
        .solutions
        .values()
        .filter(|solution| solution.problem_id == problem_id)
        .filter(|solution| solution.checked_feedback.contains(&option_id))
        .count();
    u32::try_from(used).unwrap_or(u32::MAX)
}

fn with_usage(
    data: &GradingData,
    problem_id: ProblemId,
    option_id: OptionId,
) -> Result<FeedbackOption, GradingError> {
    let mut option = data
        .tree(problem_id)?
        .get(option_id)
        .cloned()
        .ok_or_else(|| option_not_found(option_id))?;
    option.used = used_count(data, problem_id, option_id);
    Ok(option)
}

/// Revokes and counts the solutions that check more than one child of the group that just
/// became exclusive. Violations of other groups predate this change and are left alone.
fn set_aside_conflicting(
    data: &mut GradingData,
    problem_id: ProblemId,
    group_id: OptionId,
) -> Result<u32, GradingError> {
    let group = data.tree(problem_id)?.get(group_id).ok_or_else(|| option_not_found(group_id))?;
    let conflicting: Vec<_> = data
        .solutions
        .iter()
        .filter(|(_, solution)| solution.problem_id == problem_id)
        .filter(|(_, solution)| {
            group.children.iter().filter(|child| solution.checked_feedback.contains(child)).count() > 1
        })
        .map(|(key, _)| *key)
        .collect();

    for key in &conflicting {
        if let Some(solution) = data.solutions.get_mut(key) {
            solution.graded_by = None;
            solution.graded_at = None;
        }
    }
    Ok(u32::try_from(conflicting.len()).unwrap_or(u32::MAX))
}

fn required_name(name: &str) -> Result<String, GradingError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GradingError::Validation("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

pub(crate) fn option_not_found(option_id: OptionId) -> GradingError {
    GradingError::NotFound(format!("feedback option {option_id}"))
}

use crate::grading::errors::GradingError;
use crate::grading::model::{OptionId, ProblemId};
use crate::grading::tree::{FeedbackTree, TreeDelta};
use crate::services::backend::GradingBackend;

/// Holds the feedback tree of the problem currently being graded.
#[derive(Debug, Default)]
pub struct TreeStore {
    tree: Option<FeedbackTree>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: FeedbackTree) -> Self {
        Self { tree: Some(tree) }
    }

    pub fn tree(&self) -> Option<&FeedbackTree> {
        self.tree.as_ref()
    }

    pub fn require(&self) -> Result<&FeedbackTree, GradingError> {
        self.tree.as_ref().ok_or(GradingError::NotLoaded)
    }

    pub fn problem_id(&self) -> Option<ProblemId> {
        self.tree.as_ref().map(FeedbackTree::problem_id)
    }

    /// Replaces the whole tree with the backend's copy.
    ///
    /// On failure the previously loaded tree stays in place.
    pub async fn load(
        &mut self,
        backend: &dyn GradingBackend,
        problem_id: ProblemId,
    ) -> Result<&FeedbackTree, GradingError> {
        let loaded = match backend.fetch_tree(problem_id).await {
            Ok(snapshot) if snapshot.problem_id != problem_id => Err(GradingError::Conflict(
                format!("requested problem {problem_id}, backend sent {}", snapshot.problem_id),
            )),
            Ok(snapshot) => FeedbackTree::from_snapshot(snapshot),
            Err(err) => Err(err),
        };

        match loaded {
            Ok(tree) => {
                tracing::debug!(problem_id = %problem_id, options = tree.len(), "Feedback tree loaded");
                Ok(&*self.tree.insert(tree))
            }
            Err(err) => {
                tracing::warn!(
                    problem_id = %problem_id,
                    error = %err,
                    "Failed to load feedback tree; keeping previous tree"
                );
                Err(err)
            }
        }
    }

    pub fn apply_delta(&mut self, delta: TreeDelta) -> Result<Vec<OptionId>, GradingError> {
        self.tree.as_mut().ok_or(GradingError::NotLoaded)?.apply_delta(delta)
    }

    pub fn record_usage(&mut self, id: OptionId, checked: bool) -> bool {
        self.tree.as_mut().is_some_and(|tree| tree.record_usage(id, checked))
    }

    pub fn set_highlight(&mut self, id: OptionId, highlight: bool) -> bool {
        self.tree.as_mut().is_some_and(|tree| tree.set_highlight(id, highlight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn load_replaces_tree_and_indexes_it() {
        let scenario = test_support::scenario().await;
        let mut store = TreeStore::new();

        let tree = store.load(&scenario.repository, scenario.problem).await.expect("load");

        assert_eq!(tree.problem_id(), scenario.problem);
        assert_eq!(tree.get(scenario.a).expect("A").index, 1);
        assert_eq!(tree.get(scenario.x).expect("X").index, 2);
        assert_eq!(tree.get(scenario.y).expect("Y").index, 3);
        assert_eq!(tree.get(scenario.b).expect("B").index, 4);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_tree() {
        let scenario = test_support::scenario().await;
        let mut store = TreeStore::new();
        store.load(&scenario.repository, scenario.problem).await.expect("load");

        let err = store
            .load(&test_support::UnreachableBackend, ProblemId(2))
            .await
            .expect_err("backend down");

        assert!(matches!(err, GradingError::Fetch(_)));
        assert_eq!(store.problem_id(), Some(scenario.problem));
        assert_eq!(store.require().expect("tree").len(), 5);
    }

    #[tokio::test]
    async fn unknown_problem_surfaces_not_found() {
        let scenario = test_support::scenario().await;
        let mut store = TreeStore::new();

        let err = store.load(&scenario.repository, ProblemId(404)).await.expect_err("missing");

        assert!(matches!(err, GradingError::NotFound(_)));
        assert!(store.tree().is_none());
    }

    #[test]
    fn delta_without_tree_is_rejected() {
        let mut store = TreeStore::new();
        let err = store.apply_delta(TreeDelta::Deleted(OptionId(1))).unwrap_err();
        assert_eq!(err, GradingError::NotLoaded);
    }
}

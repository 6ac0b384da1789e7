use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api::router::router;
use crate::core::{config::Settings, state::AppState};
use crate::grading::errors::GradingError;
use crate::grading::model::{FeedbackOption, OptionId, ProblemId, SolutionState, SubmissionId};
use crate::repositories::FeedbackRepository;
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate, ProblemCreate, TreeSnapshot};
use crate::schemas::solution::SolutionPatch;
use crate::schemas::submission::{QueueQuery, SubmissionSummary, SubmissionView};
use crate::services::backend::GradingBackend;

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAMGRADER_ENV", "test");
    std::env::set_var("EXAMGRADER_STRICT_CONFIG", "0");
    std::env::remove_var("EXAMGRADER_HOST");
    std::env::remove_var("EXAMGRADER_PORT");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("VERSION");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::remove_var("GRADING_BACKEND_URL");
    std::env::remove_var("GRADING_BACKEND_TIMEOUT_SECONDS");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

pub(crate) fn json_request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(crate) async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json body")
}

/// Problem 1 with `root -> [A -> [X, Y], B]` (A not exclusive), problem 2 with
/// a single option, and four submissions. Submissions 1-3 are approved with
/// {X, Y}; submission 4 is approved with {X}.
pub(crate) struct Scenario {
    pub(crate) repository: FeedbackRepository,
    pub(crate) problem: ProblemId,
    pub(crate) other_problem: ProblemId,
    pub(crate) root: OptionId,
    pub(crate) a: OptionId,
    pub(crate) b: OptionId,
    pub(crate) x: OptionId,
    pub(crate) y: OptionId,
    pub(crate) submissions: Vec<SubmissionId>,
}

pub(crate) async fn scenario() -> Scenario {
    seed(FeedbackRepository::new()).await
}

pub(crate) async fn seed(repository: FeedbackRepository) -> Scenario {
    let problem = ProblemId(1);
    let other_problem = ProblemId(2);

    let root = repository
        .create_problem(ProblemCreate { problem_id: problem, root_name: "root".to_string() })
        .await
        .expect("problem")
        .id;
    let option = |parent_id, name: &str, score| NewOption {
        parent_id,
        name: name.to_string(),
        description: None,
        score,
    };
    let a = repository.create_option(problem, option(root, "A", 0)).await.expect("A").id;
    let x = repository.create_option(problem, option(a, "X", 2)).await.expect("X").id;
    let y = repository.create_option(problem, option(a, "Y", -1)).await.expect("Y").id;
    let b = repository.create_option(problem, option(root, "B", 1)).await.expect("B").id;

    let other_root = repository
        .create_problem(ProblemCreate { problem_id: other_problem, root_name: "root".to_string() })
        .await
        .expect("other problem")
        .id;
    repository
        .create_option(other_problem, option(other_root, "Units missing", -1))
        .await
        .expect("other option");

    let students = [
        (4000001, "Ada Lovelace"),
        (4000002, "Alan Turing"),
        (4000003, "Grace Hopper"),
        (4000004, "Edsger Dijkstra"),
    ];
    let mut submissions = Vec::new();
    for (offset, (student_id, name)) in (1..).zip(students) {
        let submission = repository
            .register_submission(SubmissionSummary {
                id: SubmissionId(offset),
                student_id: Some(student_id),
                student_name: Some(name.to_string()),
            })
            .await
            .expect("submission");
        let checked = if offset < 4 { vec![x, y] } else { vec![x] };
        for option_id in checked {
            repository.toggle_option(submission.id, problem, option_id).await.expect("toggle");
        }
        repository
            .update_solution(submission.id, problem, SolutionPatch::approve("seed"))
            .await
            .expect("approve");
        submissions.push(submission.id);
    }

    Scenario { repository, problem, other_problem, root, a, b, x, y, submissions }
}

/// Seeded router plus the ids behind it. Holds the env lock for the test's lifetime.
pub(crate) struct TestContext {
    pub(crate) app: axum::Router,
    pub(crate) scenario: Scenario,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let scenario = scenario().await;
    let app = router(AppState::new(settings, scenario.repository.clone()));

    TestContext { app, scenario, _guard: guard }
}

/// Backend whose every call fails as if the network were down.
pub(crate) struct UnreachableBackend;

fn unreachable() -> GradingError {
    GradingError::Fetch("connection refused".to_string())
}

#[async_trait]
impl GradingBackend for UnreachableBackend {
    async fn fetch_tree(&self, _problem_id: ProblemId) -> Result<TreeSnapshot, GradingError> {
        Err(unreachable())
    }

    async fn create_option(&self, _: ProblemId, _: NewOption) -> Result<FeedbackOption, GradingError> {
        Err(unreachable())
    }

    async fn update_option(&self, _: ProblemId, _: OptionId, _: OptionPatch) -> Result<OptionUpdate, GradingError> {
        Err(unreachable())
    }

    async fn delete_option(&self, _: ProblemId, _: OptionId) -> Result<(), GradingError> {
        Err(unreachable())
    }

    async fn fetch_solution(&self, _: SubmissionId, _: ProblemId) -> Result<SolutionState, GradingError> {
        Err(unreachable())
    }

    async fn toggle_option(&self, _: SubmissionId, _: ProblemId, _: OptionId) -> Result<SolutionState, GradingError> {
        Err(unreachable())
    }

    async fn update_solution(
        &self,
        _: SubmissionId,
        _: ProblemId,
        _: SolutionPatch,
    ) -> Result<SolutionState, GradingError> {
        Err(unreachable())
    }

    async fn navigate(&self, _: ProblemId, _: QueueQuery) -> Result<SubmissionView, GradingError> {
        Err(unreachable())
    }

    async fn list_submissions(&self, _: ProblemId) -> Result<Vec<SubmissionSummary>, GradingError> {
        Err(unreachable())
    }
}

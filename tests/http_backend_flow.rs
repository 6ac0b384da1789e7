//! Drives a grading session against the reference API over a real socket.

use std::sync::Arc;
use std::time::Duration;

use examgrader::grading::edit::OptionDraft;
use examgrader::grading::errors::GradingError;
use examgrader::grading::filter::FilterMode;
use examgrader::grading::model::{OptionId, ProblemId, SubmissionId};
use examgrader::grading::session::GradingSession;
use examgrader::repositories::FeedbackRepository;
use examgrader::schemas::feedback::{NewOption, ProblemCreate};
use examgrader::schemas::solution::SolutionPatch;
use examgrader::schemas::submission::SubmissionSummary;
use examgrader::services::backend::GradingBackend;
use examgrader::services::http_backend::HttpGradingBackend;
use examgrader::services::notifier::{Notice, QueuedNotifier};

const PROBLEM: ProblemId = ProblemId(1);

struct Seeded {
    group: OptionId,
    x: OptionId,
    y: OptionId,
}

async fn seed(repository: &FeedbackRepository) -> Seeded {
    let root = repository
        .create_problem(ProblemCreate { problem_id: PROBLEM, root_name: "root".to_string() })
        .await
        .expect("problem")
        .id;
    let option = |parent_id, name: &str, score| NewOption {
        parent_id,
        name: name.to_string(),
        description: None,
        score,
    };
    let group = repository.create_option(PROBLEM, option(root, "Method", 0)).await.expect("group").id;
    let x = repository.create_option(PROBLEM, option(group, "Correct formula", 3)).await.expect("x").id;
    let y = repository.create_option(PROBLEM, option(group, "Wrong formula", 0)).await.expect("y").id;

    for (id, name) in [(1, "Ada Lovelace"), (2, "Alan Turing"), (3, "Grace Hopper")] {
        let submission = SubmissionSummary {
            id: SubmissionId(id),
            student_id: Some(5000000 + id),
            student_name: Some(name.to_string()),
        };
        repository.register_submission(submission).await.expect("submission");
    }
    for submission in [SubmissionId(1), SubmissionId(2)] {
        repository.toggle_option(submission, PROBLEM, x).await.expect("x");
        repository.toggle_option(submission, PROBLEM, y).await.expect("y");
        repository.update_solution(submission, PROBLEM, SolutionPatch::approve("seed")).await.expect("approve");
    }

    Seeded { group, x, y }
}

async fn serve(repository: FeedbackRepository) -> String {
    let app = examgrader::reference_router(repository).expect("router");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}/api/v1")
}

#[tokio::test]
async fn session_grades_through_the_http_backend() {
    let repository = FeedbackRepository::new();
    let seeded = seed(&repository).await;
    let base_url = serve(repository.clone()).await;

    let backend = HttpGradingBackend::new(base_url, Duration::from_secs(5)).expect("client");
    let notifier = Arc::new(QueuedNotifier::new());
    let mut session = GradingSession::new(Arc::new(backend), "alice").with_notifier(notifier.clone());

    let tree = session.open_problem(PROBLEM).await.expect("open problem");
    assert_eq!(tree.get(seeded.x).expect("x").used, 2);

    session.first().await.expect("first").expect("moved");
    assert_eq!(session.current().expect("current").submission.id, SubmissionId(1));

    let report = session.set_exclusive(seeded.group, true).await.expect("exclusive");
    assert_eq!(report.cascade.expect("cascade").set_aside_count, 2);
    assert!(matches!(notifier.drain().as_slice(), [Notice::Cascade(_)]));
    assert!(!session.can_approve());

    session.toggle_option(seeded.y).await.expect("uncheck y");
    let approved = session.approve().await.expect("approve");
    assert_eq!(approved.graded_by.as_deref(), Some("alice"));
    assert_eq!(session.total_score(), Some(3));

    let stored = repository.fetch_solution(SubmissionId(1), PROBLEM).await.expect("stored");
    assert_eq!(stored.checked_feedback.into_iter().collect::<Vec<_>>(), vec![seeded.x]);
}

#[tokio::test]
async fn filters_and_edits_round_trip_over_http() {
    let repository = FeedbackRepository::new();
    let seeded = seed(&repository).await;
    let base_url = serve(repository.clone()).await;

    let backend = HttpGradingBackend::new(base_url, Duration::from_secs(5)).expect("client");
    let mut session = GradingSession::new(Arc::new(backend), "bob");
    session.open_problem(PROBLEM).await.expect("open problem");
    session.last().await.expect("last");
    assert_eq!(session.current().expect("current").submission.id, SubmissionId(3));

    session.toggle_filter(seeded.x, FilterMode::Required).await.expect("filter");
    let current = session.current().expect("current");
    assert_eq!(current.submission.id, SubmissionId(1));
    assert_eq!(current.meta.filter_matches, 2);

    let parent = session.begin_add(Some(seeded.group)).expect("begin add");
    assert_eq!(parent, seeded.group);
    let report = session.save(&OptionDraft::new("Partial formula", "", "1")).await.expect("save");
    assert!(report.removed.is_empty());
    let snapshot = repository.fetch_tree(PROBLEM).await.expect("snapshot");
    assert!(snapshot.options.iter().any(|option| option.name == "Partial formula"));

    let jumped = session.jump_to("hopper").await.expect("jump").expect("match");
    assert_eq!(jumped.submission.id, SubmissionId(3));
    assert_eq!(jumped.meta.filter_matches, 2);
    assert!(session.jump_to("qqqq").await.expect("jump").is_none());
    assert_eq!(session.current().expect("current").submission.id, SubmissionId(3));
}

#[tokio::test]
async fn server_side_rejections_surface_as_typed_errors() {
    let repository = FeedbackRepository::new();
    seed(&repository).await;
    let base_url = serve(repository).await;
    let backend = HttpGradingBackend::new(base_url, Duration::from_secs(5)).expect("client");

    let missing = backend.fetch_tree(ProblemId(99)).await.expect_err("unknown problem");
    assert_eq!(missing, GradingError::NotFound("problem 99".to_string()));

    let tree = backend.fetch_tree(PROBLEM).await.expect("tree");
    let root = backend.delete_option(PROBLEM, tree.root_id).await.expect_err("root");
    assert_eq!(root, GradingError::Conflict("the root option cannot be deleted".to_string()));

    let empty = backend
        .update_solution(SubmissionId(3), PROBLEM, SolutionPatch::approve("carol"))
        .await
        .expect_err("empty grade");
    assert!(matches!(empty, GradingError::Validation(_)));
}

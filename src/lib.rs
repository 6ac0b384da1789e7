pub(crate) mod api;
pub(crate) mod core;
pub mod grading;
pub mod repositories;
pub mod schemas;
pub mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::repositories::FeedbackRepository;
use crate::services::backend::GradingBackend;
use crate::services::http_backend::HttpGradingBackend;

/// Serves the in-memory reference backend until a shutdown signal arrives.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = AppState::new(settings, FeedbackRepository::new());
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Exam grader API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!(problems = state.repository().problem_count().await, "Exam grader API stopped");
    Ok(())
}

/// HTTP surface of `repository`, configured from the environment.
pub fn reference_router(repository: FeedbackRepository) -> anyhow::Result<axum::Router> {
    let settings = Settings::load()?;
    Ok(api::router::router(AppState::new(settings, repository)))
}

/// Backend for a [`GradingSession`](crate::grading::session::GradingSession):
/// the remote service named by `GRADING_BACKEND_URL`, or a fresh in-memory
/// repository when it is unset.
pub fn connect_backend() -> anyhow::Result<Arc<dyn GradingBackend>> {
    let settings = Settings::load()?;
    match HttpGradingBackend::from_settings(&settings)? {
        Some(remote) => {
            tracing::info!(base_url = remote.base_url(), "Using remote grading backend");
            Ok(Arc::new(remote))
        }
        None => {
            tracing::info!("GRADING_BACKEND_URL unset; using in-memory grading backend");
            Ok(Arc::new(FeedbackRepository::new()))
        }
    }
}

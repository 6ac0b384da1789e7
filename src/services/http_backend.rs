use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::config::Settings;
use crate::grading::errors::GradingError;
use crate::grading::model::{FeedbackOption, OptionId, ProblemId, SolutionState, SubmissionId};
use crate::schemas::feedback::{NewOption, OptionPatch, OptionUpdate, TreeSnapshot};
use crate::schemas::solution::{SolutionPatch, ToggleRequest};
use crate::schemas::submission::{QueueQuery, SubmissionSummary, SubmissionView};
use crate::services::backend::GradingBackend;

/// Talks to a grading service over its REST API.
#[derive(Debug, Clone)]
pub struct HttpGradingBackend {
    client: Client,
    base_url: String,
}

impl HttpGradingBackend {
    /// `base_url` includes the API prefix, e.g. `http://grading:8000/api/v1`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_timeouts(base_url.into(), timeout, timeout.min(Duration::from_secs(10)))
    }

    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let backend = settings.backend();
        let Some(url) = backend.url.clone() else {
            return Ok(None);
        };
        Self::with_timeouts(url, backend.timeout(), backend.connect_timeout()).map(Some)
    }

    fn with_timeouts(base_url: String, timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .context("Failed to build grading backend HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T, GradingError> {
        let response = self.execute(request, action).await?;
        response.json::<T>().await.map_err(|err| {
            tracing::warn!(error = %err, action, "Grading backend returned an unreadable body");
            GradingError::Fetch(format!("{action}: unreadable response: {err}"))
        })
    }

    async fn execute(&self, request: RequestBuilder, action: &str) -> Result<reqwest::Response, GradingError> {
        let response = request.send().await.map_err(|err| {
            tracing::warn!(error = %err, action, "Grading backend unreachable");
            GradingError::Fetch(format!("{action}: {err}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = error_for_status(status, &body, action);
        tracing::debug!(status = status.as_u16(), error = %err, action, "Grading backend refused request");
        Err(err)
    }
}

#[async_trait]
impl GradingBackend for HttpGradingBackend {
    async fn fetch_tree(&self, problem_id: ProblemId) -> Result<TreeSnapshot, GradingError> {
        let request = self.client.get(self.url(&format!("/feedback/{problem_id}")));
        self.send(request, "fetch feedback tree").await
    }

    async fn create_option(
        &self,
        problem_id: ProblemId,
        option: NewOption,
    ) -> Result<FeedbackOption, GradingError> {
        let request = self.client.post(self.url(&format!("/feedback/{problem_id}"))).json(&option);
        self.send(request, "create feedback option").await
    }

    async fn update_option(
        &self,
        problem_id: ProblemId,
        option_id: OptionId,
        patch: OptionPatch,
    ) -> Result<OptionUpdate, GradingError> {
        let request = self
            .client
            .patch(self.url(&format!("/feedback/{problem_id}/{option_id}")))
            .json(&patch);
        self.send(request, "update feedback option").await
    }

    async fn delete_option(&self, problem_id: ProblemId, option_id: OptionId) -> Result<(), GradingError> {
        let request = self.client.delete(self.url(&format!("/feedback/{problem_id}/{option_id}")));
        self.execute(request, "delete feedback option").await.map(|_| ())
    }

    async fn fetch_solution(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
    ) -> Result<SolutionState, GradingError> {
        let request = self.client.get(self.url(&format!("/solutions/{submission_id}/{problem_id}")));
        self.send(request, "fetch solution").await
    }

    async fn toggle_option(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        option_id: OptionId,
    ) -> Result<SolutionState, GradingError> {
        let request = self
            .client
            .put(self.url(&format!("/solutions/{submission_id}/{problem_id}/toggle")))
            .json(&ToggleRequest { option_id });
        self.send(request, "toggle feedback option").await
    }

    async fn update_solution(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        patch: SolutionPatch,
    ) -> Result<SolutionState, GradingError> {
        let request = self
            .client
            .patch(self.url(&format!("/solutions/{submission_id}/{problem_id}")))
            .json(&patch);
        self.send(request, "update solution").await
    }

    async fn navigate(&self, problem_id: ProblemId, query: QueueQuery) -> Result<SubmissionView, GradingError> {
        let request = self
            .client
            .post(self.url(&format!("/submissions/{problem_id}/navigate")))
            .json(&query);
        self.send(request, "navigate submissions").await
    }

    async fn list_submissions(&self, problem_id: ProblemId) -> Result<Vec<SubmissionSummary>, GradingError> {
        let request = self.client.get(self.url(&format!("/submissions/{problem_id}")));
        self.send(request, "list submissions").await
    }
}

fn error_for_status(status: StatusCode, body: &str, action: &str) -> GradingError {
    let detail = serde_json::from_str::<Value>(body)
        .map(|payload| extract_error_message(&payload))
        .unwrap_or_else(|_| body.trim().to_string());
    let detail = if detail.is_empty() { status.to_string() } else { detail };

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => GradingError::Validation(detail),
        StatusCode::NOT_FOUND => GradingError::NotFound(detail),
        StatusCode::CONFLICT => GradingError::Conflict(detail),
        _ => GradingError::Fetch(format!("{action} failed (status {status}): {detail}")),
    }
}

fn extract_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail").and_then(Value::as_str) {
        return detail.to_string();
    }

    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_grading_errors() {
        let body = r#"{"status": 409, "detail": "the root option cannot be deleted"}"#;
        assert_eq!(
            error_for_status(StatusCode::CONFLICT, body, "delete feedback option"),
            GradingError::Conflict("the root option cannot be deleted".to_string())
        );
        assert!(matches!(
            error_for_status(StatusCode::UNPROCESSABLE_ENTITY, "missing field `name`", "create"),
            GradingError::Validation(message) if message == "missing field `name`"
        ));
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, "", "fetch"),
            GradingError::NotFound(message) if message == "404 Not Found"
        ));
    }

    #[test]
    fn server_errors_become_fetch_failures() {
        let err = error_for_status(StatusCode::BAD_GATEWAY, r#"{"error": "upstream"}"#, "list submissions");
        assert_eq!(
            err,
            GradingError::Fetch("list submissions failed (status 502 Bad Gateway): upstream".to_string())
        );
        assert!(err.requires_refetch());
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let backend = HttpGradingBackend::new("http://localhost:8000/api/v1/", Duration::from_secs(5)).expect("client");
        assert_eq!(backend.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(backend.url("/feedback/3"), "http://localhost:8000/api/v1/feedback/3");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_fetch_error() {
        let backend = HttpGradingBackend::new("http://127.0.0.1:9", Duration::from_millis(500)).expect("client");
        let err = backend.fetch_tree(ProblemId(1)).await.expect_err("nothing listens on port 9");
        assert!(matches!(err, GradingError::Fetch(_)));
    }
}

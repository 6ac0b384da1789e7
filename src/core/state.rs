use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::FeedbackRepository;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    repository: FeedbackRepository,
}

impl AppState {
    pub(crate) fn new(settings: Settings, repository: FeedbackRepository) -> Self {
        Self { inner: Arc::new(InnerState { settings, repository }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn repository(&self) -> &FeedbackRepository {
        &self.inner.repository
    }
}

use std::sync::Mutex;

use crate::grading::errors::{CascadeWarning, GradingError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Cascade(CascadeWarning),
    Error(GradingError),
}

/// Toast surface for messages the grader must see.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Cascade(warning) => tracing::warn!(
                problem_id = %warning.problem_id,
                option_id = %warning.option_id,
                set_aside = warning.set_aside_count,
                "{warning}"
            ),
            Notice::Error(err) => tracing::error!(error = %err, "Grading action failed"),
        }
    }
}

/// Collects notices until the host drains them into its UI.
#[derive(Debug, Default)]
pub struct QueuedNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl QueuedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, notice: Notice) {
        TracingNotifier.notify(notice.clone());
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::model::{OptionId, ProblemId};

    #[test]
    fn queued_notices_drain_once() {
        let notifier = QueuedNotifier::new();
        let warning = CascadeWarning {
            problem_id: ProblemId(1),
            option_id: OptionId(2),
            set_aside_count: 3,
        };
        notifier.notify(Notice::Cascade(warning));
        notifier.notify(Notice::Error(GradingError::Fetch("timeout".to_string())));

        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], Notice::Cascade(warning));
        assert!(notifier.drain().is_empty());
    }
}

use crate::diagnostics::DiagnosticReport;
use std::time::Duration;

/// Outcome of one interaction step, kept for the run summary.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub target: String,
    pub succeeded: bool,
    /// Index of the strategy that located the target, when one did.
    pub strategy_index: Option<usize>,
    pub elapsed: Duration,
    pub diagnostic: Option<DiagnosticReport>,
}

impl StepResult {
    pub fn success(target: impl Into<String>, strategy_index: usize, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            succeeded: true,
            strategy_index: Some(strategy_index),
            elapsed,
            diagnostic: None,
        }
    }

    pub fn failure(target: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            succeeded: false,
            strategy_index: None,
            elapsed,
            diagnostic: None,
        }
    }

    /// A step that was not attempted, e.g. a cover upload with no cover set.
    pub fn skipped(target: impl Into<String>) -> Self {
        Self::failure(target, Duration::ZERO)
    }

    pub fn with_diagnostic(mut self, report: Option<DiagnosticReport>) -> Self {
        self.diagnostic = report;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_records_strategy() {
        let step = StepResult::success("title field", 2, Duration::from_millis(40));
        assert!(step.succeeded);
        assert_eq!(step.strategy_index, Some(2));
        assert!(step.diagnostic.is_none());
    }

    #[test]
    fn skipped_is_an_instant_failure() {
        let step = StepResult::skipped("cover image");
        assert!(!step.succeeded);
        assert_eq!(step.strategy_index, None);
        assert_eq!(step.elapsed, Duration::ZERO);
    }
}

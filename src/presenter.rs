//! Result presentation service
//!
//! This module separates outcome presentation from orchestration logic,
//! allowing different frontends to surface results their own way.

use crate::error::RemovalError;
use crate::types::ProcessingOutput;

/// Trait for presenting the outcome of a processing request
///
/// The orchestrator forwards every recorded success and every
/// presentable error; superseded (canceled) operations are never
/// forwarded.
pub trait ResultPresenter: Send + Sync {
    /// Present a successful processing output
    fn present_output(&self, output: &ProcessingOutput);

    /// Present a classified error
    fn present_error(&self, error: &RemovalError);
}

/// No-op presenter that discards all outcomes
pub struct NoOpResultPresenter;

impl ResultPresenter for NoOpResultPresenter {
    fn present_output(&self, _output: &ProcessingOutput) {
        // Intentionally empty - discards outputs
    }

    fn present_error(&self, _error: &RemovalError) {
        // Intentionally empty - discards errors
    }
}

/// Presenter that emits outcomes through the `log` facade
pub struct LogResultPresenter {
    verbose: bool,
}

impl LogResultPresenter {
    /// Create a new logging presenter
    ///
    /// # Arguments
    /// * `verbose` - Whether to include job details on success
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ResultPresenter for LogResultPresenter {
    fn present_output(&self, output: &ProcessingOutput) {
        log::info!(
            "✅ Background removed via {} backend in {}ms",
            output.method,
            output.metadata.elapsed_ms
        );

        if self.verbose {
            if let Some(job_id) = &output.metadata.job_id {
                log::info!("  • Job: {job_id}");
            }
            if let Some(polls) = output.metadata.poll_count {
                log::info!("  • Status queries: {polls}");
            }
        }
    }

    fn present_error(&self, error: &RemovalError) {
        if let Some(message) = error.user_message() {
            log::error!("❌ {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageRef, Method, ProcessingMetadata};
    use std::sync::Mutex;

    struct RecordingPresenter {
        outputs: Mutex<Vec<Method>>,
        errors: Mutex<Vec<String>>,
    }

    impl RecordingPresenter {
        fn new() -> Self {
            Self {
                outputs: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
            }
        }
    }

    impl ResultPresenter for RecordingPresenter {
        fn present_output(&self, output: &ProcessingOutput) {
            self.outputs.lock().unwrap().push(output.method);
        }

        fn present_error(&self, error: &RemovalError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn sample_output() -> ProcessingOutput {
        ProcessingOutput::new(
            ImageRef::Url("https://x/y.png".to_string()),
            Method::Remote,
            ProcessingMetadata::new(42),
        )
    }

    #[test]
    fn test_recording_presenter_captures_outcomes() {
        let presenter = RecordingPresenter::new();
        presenter.present_output(&sample_output());
        presenter.present_error(&RemovalError::PollTimeout);

        assert_eq!(presenter.outputs.lock().unwrap().as_slice(), &[Method::Remote]);
        assert_eq!(presenter.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_log_presenter_does_not_panic() {
        let presenter = LogResultPresenter::new(true);
        presenter.present_output(&sample_output());
        presenter.present_error(&RemovalError::NoInput);
        // Canceled has no user message; nothing should be emitted
        presenter.present_error(&RemovalError::Canceled);
    }

    #[test]
    fn test_noop_presenter() {
        let presenter = NoOpResultPresenter;
        presenter.present_output(&sample_output());
        presenter.present_error(&RemovalError::Auth);
    }
}

//! Unified processing orchestrator
//!
//! This module provides the `ProcessingOrchestrator` that consolidates all
//! business logic for driving a background removal request end-to-end:
//! backend selection, pre-flight validation, single-operation-in-flight
//! enforcement, and normalization of backend-specific outcomes into one
//! result surface. CLI and embedding frontends share this type so behavior
//! stays consistent.

use instant::Instant;
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug as trace_debug, info as trace_info, instrument};

use crate::{
    credentials::{CredentialStore, MemoryCredentialStore},
    error::{RemovalError, Result},
    inference::LocalInferenceEngine,
    prediction::{PredictionClient, TerminalJobState, UNKNOWN_FAILURE_REASON},
    presenter::{NoOpResultPresenter, ResultPresenter},
    types::{ImageRef, Method, ProcessingMetadata, ProcessingOutput, ProcessingRequest},
};

/// Model version pinned for remote predictions (u2net segmentation)
pub const DEFAULT_MODEL_VERSION: &str =
    "e4a30157c2a6f43ea49e29e1fec5618b75b40af3e3dee8e0ba5c13cd7568daf8";

/// Mutable operation state guarded by the orchestrator's lock
///
/// The generation counter is the identity of the active operation; any
/// asynchronous response must present a matching generation before it may
/// touch `output`.
struct OperationState {
    generation: u64,
    cancel: Option<CancellationToken>,
    output: Option<ProcessingOutput>,
}

struct OrchestratorInner {
    model_version: String,
    client: PredictionClient,
    engine: Option<Box<dyn LocalInferenceEngine>>,
    store: Box<dyn CredentialStore>,
    presenter: Box<dyn ResultPresenter>,
    state: Mutex<OperationState>,
}

/// Orchestrator driving background removal across both backends
///
/// Cheap to clone; clones share the same operation state, so a `process`
/// driven from one task can be superseded or reset from another.
#[derive(Clone)]
pub struct ProcessingOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl ProcessingOrchestrator {
    /// Create a new orchestrator builder
    #[must_use]
    pub fn builder() -> ProcessingOrchestratorBuilder {
        ProcessingOrchestratorBuilder::new()
    }

    /// Process one request end-to-end
    ///
    /// Validates the request, dispatches to the selected backend, and
    /// normalizes the outcome. At most one operation is in flight per
    /// orchestrator: starting a new one cancels and supersedes the
    /// previous, whose call resolves [`RemovalError::Canceled`].
    ///
    /// Successful outputs and presentable errors are forwarded to the
    /// configured presenter; cancellations are silent.
    ///
    /// # Errors
    /// - [`RemovalError::NoInput`] when the request carries no image
    /// - [`RemovalError::MissingCredential`] for the remote method with
    ///   no stored credential, before any network call
    /// - [`RemovalError::InvalidConfig`] for the local method with no
    ///   injected engine
    /// - Classified backend errors (see [`RemovalError`])
    #[instrument(skip(self, request), fields(method = %request.method()))]
    pub async fn process(&self, request: &ProcessingRequest) -> Result<ProcessingOutput> {
        let result = self.process_inner(request).await;
        match &result {
            Ok(output) => self.inner.presenter.present_output(output),
            Err(err) if !err.is_canceled() => self.inner.presenter.present_error(err),
            Err(_) => {},
        }
        result
    }

    async fn process_inner(&self, request: &ProcessingRequest) -> Result<ProcessingOutput> {
        // Validation happens before the operation slot is touched: a
        // doomed request must not cancel work already in flight
        let image_bytes = request.image_bytes().ok_or(RemovalError::NoInput)?;
        let method = request.method();
        match method {
            Method::Remote if self.inner.store.get().is_none() => {
                return Err(RemovalError::MissingCredential);
            },
            Method::Local if self.inner.engine.is_none() => {
                return Err(RemovalError::invalid_config(
                    "No local inference engine configured. Must be injected by the embedding frontend.",
                ));
            },
            _ => {},
        }

        let (generation, cancel) = self.begin_operation();
        trace_info!(%method, generation, "🎯 Starting background removal");

        let result = match method {
            Method::Local => self.run_local(image_bytes, &cancel).await,
            Method::Remote => self.run_remote(image_bytes, &cancel).await,
        };

        self.finish_operation(generation, result)
    }

    /// Clear all held state and cancel any in-flight operation
    ///
    /// Responses belonging to the canceled operation are discarded when
    /// they eventually arrive; they can never repopulate the cleared
    /// state.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if let Some(cancel) = state.cancel.take() {
            debug!("Canceling in-flight operation {}", state.generation);
            cancel.cancel();
        }
        state.generation += 1;
        state.output = None;
        info!("Orchestrator state reset");
    }

    /// Output of the most recent completed request, if any
    ///
    /// `None` after [`ProcessingOrchestrator::reset`] or while no request
    /// has completed successfully.
    #[must_use]
    pub fn output(&self) -> Option<ProcessingOutput> {
        self.lock_state().output.clone()
    }

    /// Take over the single operation slot, superseding outstanding work
    fn begin_operation(&self) -> (u64, CancellationToken) {
        let mut state = self.lock_state();
        if let Some(previous) = state.cancel.take() {
            debug!("Superseding in-flight operation {}", state.generation);
            previous.cancel();
        }
        state.generation += 1;
        // A new request invalidates the previous result
        state.output = None;
        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        (state.generation, cancel)
    }

    /// Record an outcome unless the operation was superseded
    ///
    /// Checked under the state lock: a result carrying a stale generation
    /// is discarded and the call resolves [`RemovalError::Canceled`].
    fn finish_operation(
        &self,
        generation: u64,
        result: Result<ProcessingOutput>,
    ) -> Result<ProcessingOutput> {
        let mut state = self.lock_state();
        if state.generation != generation {
            debug!("Discarding stale result of superseded operation {generation}");
            return Err(RemovalError::Canceled);
        }
        state.cancel = None;
        match result {
            Ok(output) => {
                state.output = Some(output.clone());
                Ok(output)
            },
            Err(err) => Err(err),
        }
    }

    async fn run_local(
        &self,
        image_bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ProcessingOutput> {
        let engine = self.inner.engine.as_ref().ok_or_else(|| {
            RemovalError::invalid_config(
                "No local inference engine configured. Must be injected by the embedding frontend.",
            )
        })?;

        let started = Instant::now();
        let handle = tokio::select! {
            () = cancel.cancelled() => return Err(RemovalError::Canceled),
            decoded = engine.decode_image(image_bytes) => decoded?,
        };
        let (width, height) = handle.dimensions();
        trace_debug!(dimensions = %format!("{width}x{height}"), "Decoded input image");

        let output_bytes = tokio::select! {
            () = cancel.cancelled() => return Err(RemovalError::Canceled),
            removed = engine.remove_background(handle) => removed?,
        };

        let metadata = ProcessingMetadata::new(elapsed_ms(&started));
        Ok(ProcessingOutput::new(
            ImageRef::Bytes(output_bytes),
            Method::Local,
            metadata,
        ))
    }

    async fn run_remote(
        &self,
        image_bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ProcessingOutput> {
        let credential = self
            .inner
            .store
            .get()
            .ok_or(RemovalError::MissingCredential)?;
        let client = &self.inner.client;
        let started = Instant::now();

        let handle = tokio::select! {
            () = cancel.cancelled() => return Err(RemovalError::Canceled),
            created = client.create_job(image_bytes, &self.inner.model_version, &credential) => {
                created?
            },
        };

        let outcome = client.poll_job(&handle, &credential, cancel).await?;
        match outcome.state {
            TerminalJobState::Succeeded(url) => {
                let metadata = ProcessingMetadata::new(elapsed_ms(&started))
                    .with_job(handle.id().to_string(), outcome.attempts);
                Ok(ProcessingOutput::new(
                    ImageRef::Url(url),
                    Method::Remote,
                    metadata,
                ))
            },
            TerminalJobState::Failed(reason) => Err(RemovalError::PredictionFailed(
                reason.unwrap_or_else(|| UNKNOWN_FAILURE_REASON.to_string()),
            )),
            TerminalJobState::Canceled => Err(RemovalError::prediction_failed(
                "The service canceled the prediction",
            )),
            TerminalJobState::TimedOut => Err(RemovalError::PollTimeout),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, OperationState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Builder for [`ProcessingOrchestrator`]
pub struct ProcessingOrchestratorBuilder {
    model_version: String,
    client: Option<PredictionClient>,
    engine: Option<Box<dyn LocalInferenceEngine>>,
    store: Option<Box<dyn CredentialStore>>,
    presenter: Option<Box<dyn ResultPresenter>>,
}

impl ProcessingOrchestratorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            client: None,
            engine: None,
            store: None,
            presenter: None,
        }
    }

    /// Set the remote model version to run
    #[must_use]
    pub fn model_version<S: Into<String>>(mut self, version: S) -> Self {
        self.model_version = version.into();
        self
    }

    /// Use a preconfigured prediction client
    #[must_use]
    pub fn prediction_client(mut self, client: PredictionClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Inject a local inference engine
    ///
    /// Without one, local requests fail with
    /// [`RemovalError::InvalidConfig`].
    #[must_use]
    pub fn local_engine(mut self, engine: Box<dyn LocalInferenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Use a custom credential store (defaults to an empty in-memory
    /// store)
    #[must_use]
    pub fn credential_store(mut self, store: Box<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom result presenter (defaults to a no-op)
    #[must_use]
    pub fn result_presenter(mut self, presenter: Box<dyn ResultPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Validate configuration and build the orchestrator
    ///
    /// # Errors
    /// - Empty model version
    /// - Failed to create the default prediction client
    pub fn build(self) -> Result<ProcessingOrchestrator> {
        if self.model_version.trim().is_empty() {
            return Err(RemovalError::invalid_config(
                "Model version must not be empty",
            ));
        }

        let client = match self.client {
            Some(client) => client,
            None => PredictionClient::new()?,
        };

        Ok(ProcessingOrchestrator {
            inner: Arc::new(OrchestratorInner {
                model_version: self.model_version,
                client,
                engine: self.engine,
                store: self.store.unwrap_or_else(|| Box::new(MemoryCredentialStore::new())),
                presenter: self.presenter.unwrap_or_else(|| Box::new(NoOpResultPresenter)),
                state: Mutex::new(OperationState {
                    generation: 0,
                    cancel: None,
                    output: None,
                }),
            }),
        })
    }
}

impl Default for ProcessingOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::inference::{ImageHandle, LocalEngineError};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct StubEngine {
        output: Vec<u8>,
    }

    #[async_trait]
    impl LocalInferenceEngine for StubEngine {
        async fn decode_image(
            &self,
            _bytes: &[u8],
        ) -> std::result::Result<ImageHandle, LocalEngineError> {
            Ok(ImageHandle::new(image::DynamicImage::new_rgba8(2, 2)))
        }

        async fn remove_background(
            &self,
            _handle: ImageHandle,
        ) -> std::result::Result<Vec<u8>, LocalEngineError> {
            Ok(self.output.clone())
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl LocalInferenceEngine for FailingEngine {
        async fn decode_image(
            &self,
            _bytes: &[u8],
        ) -> std::result::Result<ImageHandle, LocalEngineError> {
            Err(LocalEngineError::new("model not loaded"))
        }

        async fn remove_background(
            &self,
            _handle: ImageHandle,
        ) -> std::result::Result<Vec<u8>, LocalEngineError> {
            Err(LocalEngineError::new("unreachable"))
        }
    }

    struct RecordingPresenter {
        outputs: StdMutex<Vec<Method>>,
        errors: StdMutex<Vec<String>>,
    }

    impl RecordingPresenter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                outputs: StdMutex::new(Vec::new()),
                errors: StdMutex::new(Vec::new()),
            })
        }
    }

    impl ResultPresenter for Arc<RecordingPresenter> {
        fn present_output(&self, output: &ProcessingOutput) {
            self.outputs.lock().unwrap().push(output.method);
        }

        fn present_error(&self, error: &RemovalError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn test_builder_rejects_empty_model_version() {
        let err = ProcessingOrchestrator::builder()
            .model_version("  ")
            .build()
            .err();
        assert!(matches!(err, Some(RemovalError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_no_input_short_circuits() {
        let orchestrator = ProcessingOrchestrator::builder().build().unwrap();
        let request = ProcessingRequest::without_image(Method::Remote);
        let err = orchestrator.process(&request).await.unwrap_err();
        assert!(matches!(err, RemovalError::NoInput));
        assert!(orchestrator.output().is_none());
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let orchestrator = ProcessingOrchestrator::builder().build().unwrap();
        let request = ProcessingRequest::new(vec![1, 2, 3], Method::Remote);
        let err = orchestrator.process(&request).await.unwrap_err();
        assert!(matches!(err, RemovalError::MissingCredential));
    }

    #[tokio::test]
    async fn test_local_without_engine_is_invalid_config() {
        let orchestrator = ProcessingOrchestrator::builder().build().unwrap();
        let request = ProcessingRequest::new(vec![1, 2, 3], Method::Local);
        let err = orchestrator.process(&request).await.unwrap_err();
        assert!(matches!(err, RemovalError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_local_engine_success_records_output() {
        let presenter = RecordingPresenter::new();
        let orchestrator = ProcessingOrchestrator::builder()
            .local_engine(Box::new(StubEngine {
                output: vec![7, 7, 7],
            }))
            .result_presenter(Box::new(Arc::clone(&presenter)))
            .build()
            .unwrap();

        let request = ProcessingRequest::new(vec![1, 2, 3], Method::Local);
        let output = orchestrator.process(&request).await.unwrap();
        assert_eq!(output.method, Method::Local);
        assert_eq!(output.image.as_bytes(), Some([7, 7, 7].as_slice()));

        // Recorded and presented
        let recorded = orchestrator.output().unwrap();
        assert_eq!(recorded.image.as_bytes(), Some([7, 7, 7].as_slice()));
        assert_eq!(presenter.outputs.lock().unwrap().as_slice(), &[Method::Local]);
        assert!(presenter.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_engine_failure_is_classified_and_presented() {
        let presenter = RecordingPresenter::new();
        let orchestrator = ProcessingOrchestrator::builder()
            .local_engine(Box::new(FailingEngine))
            .result_presenter(Box::new(Arc::clone(&presenter)))
            .build()
            .unwrap();

        let request = ProcessingRequest::new(vec![1, 2, 3], Method::Local);
        let err = orchestrator.process(&request).await.unwrap_err();
        assert!(matches!(err, RemovalError::LocalEngine(_)));
        assert!(orchestrator.output().is_none());
        assert_eq!(presenter.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_output() {
        let orchestrator = ProcessingOrchestrator::builder()
            .local_engine(Box::new(StubEngine { output: vec![1] }))
            .build()
            .unwrap();

        let request = ProcessingRequest::new(vec![1, 2, 3], Method::Local);
        orchestrator.process(&request).await.unwrap();
        assert!(orchestrator.output().is_some());

        orchestrator.reset();
        assert!(orchestrator.output().is_none());
    }

    #[tokio::test]
    async fn test_new_request_clears_previous_output_before_running() {
        // Remote calls go to a closed local port so the run fails fast
        // without leaving the machine
        let config = crate::prediction::PredictionClientConfig::builder()
            .base_url("http://127.0.0.1:1")
            .request_timeout(std::time::Duration::from_secs(1))
            .build()
            .unwrap();
        let orchestrator = ProcessingOrchestrator::builder()
            .prediction_client(PredictionClient::with_config(config).unwrap())
            .local_engine(Box::new(StubEngine { output: vec![1] }))
            .build()
            .unwrap();

        let request = ProcessingRequest::new(vec![1], Method::Local);
        orchestrator.process(&request).await.unwrap();
        assert!(orchestrator.output().is_some());

        // A failing validation must not clear the recorded result
        let invalid = ProcessingRequest::without_image(Method::Local);
        let _ = orchestrator.process(&invalid).await;
        assert!(orchestrator.output().is_some());

        // A failing run does clear it
        orchestrator.inner.store.set(Credential::new("tok"));
        let remote = ProcessingRequest::new(vec![1], Method::Remote);
        let err = orchestrator.process(&remote).await.unwrap_err();
        assert!(matches!(err, RemovalError::Network(_)));
        assert!(orchestrator.output().is_none());
    }
}

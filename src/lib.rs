#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # nobg
//!
//! Hybrid background removal with two interchangeable backends behind a
//! single orchestrator: in-process inference through an injected engine,
//! or the remote prediction service's create-then-poll protocol.
//!
//! ## Features
//!
//! - **Backend selection per request**: local inference or the remote
//!   service, chosen at submission time
//! - **Single operation in flight**: a new request supersedes the one
//!   currently running; stale responses are discarded and can never
//!   overwrite newer state
//! - **Pre-flight validation**: missing input or a missing credential is
//!   rejected before any backend work starts
//! - **Pluggable credential storage**: in-memory and file-backed stores
//!   for the remote API token
//! - **Uniform error surface**: backend failures classified into one
//!   error type with ready-to-display user messages
//! - **CLI Integration**: optional command-line interface (enable with
//!   the `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nobg::{remove_background_remote, Credential};
//!
//! # async fn example() -> nobg::Result<()> {
//! let image = std::fs::read("photo.jpg")?;
//! let output = remove_background_remote(image, Credential::new("r8_...")).await?;
//! if let Some(url) = output.image.as_url() {
//!     println!("Processed image available at {url}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! - **Library Usage**: orchestration, both backends, and credential
//!   storage are available by default
//! - **CLI Usage**: the `cli` feature (default) adds the `nobg` binary
//!   and tracing setup
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! nobg = { version = "0.1", default-features = false }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod credentials;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod prediction;
pub mod presenter;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Public API exports
pub use credentials::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{RemovalError, Result};
pub use inference::{ImageHandle, LocalEngineError, LocalInferenceEngine};
pub use orchestrator::{
    ProcessingOrchestrator, ProcessingOrchestratorBuilder, DEFAULT_MODEL_VERSION,
};
pub use prediction::{
    encode_data_uri, JobHandle, JobStatus, PollOutcome, PredictionClient, PredictionClientConfig,
    PredictionClientConfigBuilder, TerminalJobState, DEFAULT_BASE_URL, DEFAULT_MAX_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
pub use presenter::{LogResultPresenter, NoOpResultPresenter, ResultPresenter};
pub use types::{ImageRef, Method, ProcessingMetadata, ProcessingOutput, ProcessingRequest};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove a background through the remote prediction service
///
/// Convenience wrapper that builds a one-shot orchestrator around an
/// in-memory store holding the given credential. The returned output
/// references the processed image by URL; fetch the bytes with
/// [`PredictionClient::download_output`] when needed.
///
/// # Examples
///
/// ```rust,no_run
/// use nobg::{remove_background_remote, Credential};
///
/// # async fn example(upload_bytes: Vec<u8>) -> nobg::Result<()> {
/// let output = remove_background_remote(upload_bytes, Credential::new("r8_...")).await?;
/// println!("Finished in {}ms", output.metadata.elapsed_ms);
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_remote(
    image_bytes: Vec<u8>,
    credential: Credential,
) -> Result<ProcessingOutput> {
    let store = MemoryCredentialStore::new();
    store.set(credential);
    let orchestrator = ProcessingOrchestrator::builder()
        .credential_store(Box::new(store))
        .build()?;
    let request = ProcessingRequest::new(image_bytes, Method::Remote);
    orchestrator.process(&request).await
}

/// Remove a background in-process with the given inference engine
///
/// # Examples
///
/// ```rust,no_run
/// use nobg::{remove_background_local, LocalInferenceEngine};
///
/// # async fn example(engine: Box<dyn LocalInferenceEngine>) -> nobg::Result<()> {
/// let image = std::fs::read("photo.jpg")?;
/// let output = remove_background_local(image, engine).await?;
/// output.save("photo-nobg.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_local(
    image_bytes: Vec<u8>,
    engine: Box<dyn LocalInferenceEngine>,
) -> Result<ProcessingOutput> {
    let orchestrator = ProcessingOrchestrator::builder()
        .local_engine(engine)
        .build()?;
    let request = ProcessingRequest::new(image_bytes, Method::Local);
    orchestrator.process(&request).await
}

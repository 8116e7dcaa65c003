//! Remote prediction service client
//!
//! This module drives the asynchronous create-then-poll protocol of the
//! remote background removal service: image upload as a self-contained
//! data URI, fixed-interval status polling with a bounded attempt
//! ceiling, immediate classification of HTTP failures, and cancellable
//! waits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::credentials::Credential;
use crate::error::{RemovalError, Result};

/// Default production endpoint of the prediction service
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Default wait between status queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default ceiling on status queries per job (with the default interval,
/// roughly five minutes)
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Default timeout applied to each individual HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reason substituted when the service fails a job without an explanation
pub(crate) const UNKNOWN_FAILURE_REASON: &str = "Unknown error";

/// Configuration for [`PredictionClient`]
#[derive(Debug, Clone)]
pub struct PredictionClientConfig {
    /// Service endpoint, without a trailing slash
    pub base_url: String,

    /// Wait between consecutive status queries
    pub poll_interval: Duration,

    /// Maximum number of status queries per job
    pub max_poll_attempts: u32,

    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,
}

impl Default for PredictionClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PredictionClientConfig {
    /// Create a builder with default values
    #[must_use]
    pub fn builder() -> PredictionClientConfigBuilder {
        PredictionClientConfigBuilder::new()
    }
}

/// Builder for [`PredictionClientConfig`]
#[derive(Debug)]
pub struct PredictionClientConfigBuilder {
    config: PredictionClientConfig,
}

impl PredictionClientConfigBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PredictionClientConfig::default(),
        }
    }

    /// Set the service endpoint (tests point this at a mock server)
    #[must_use]
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the wait between status queries
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the ceiling on status queries per job
    #[must_use]
    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.config.max_poll_attempts = attempts;
        self
    }

    /// Set the per-request HTTP timeout
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    /// - Empty base URL
    /// - Zero poll attempt ceiling
    pub fn build(mut self) -> Result<PredictionClientConfig> {
        if self.config.base_url.trim().is_empty() {
            return Err(RemovalError::invalid_config("Base URL must not be empty"));
        }
        if self.config.max_poll_attempts == 0 {
            return Err(RemovalError::invalid_config(
                "Poll attempt ceiling must be at least 1",
            ));
        }
        // Normalize so path concatenation never doubles a slash
        while self.config.base_url.ends_with('/') {
            self.config.base_url.pop();
        }
        Ok(self.config)
    }
}

impl Default for PredictionClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-reported lifecycle states of a prediction job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job accepted, not yet running
    Starting,
    /// Job currently executing
    Processing,
    /// Job finished with output
    Succeeded,
    /// Job finished unsuccessfully
    Failed,
    /// Job canceled on the server side
    Canceled,
}

/// Request body for creating a prediction
#[derive(Debug, Serialize)]
struct CreatePredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

/// Model input payload: the image as a data URI
#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    image: &'a str,
}

/// Prediction resource as returned by the service
///
/// Unknown fields are ignored; `output` and `error` are absent until the
/// job reaches the corresponding state.
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
    status: JobStatus,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

/// Handle to a created prediction job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: String,
}

impl JobHandle {
    /// Server-assigned job id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Terminal outcome of a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalJobState {
    /// Job succeeded with an output reference
    Succeeded(String),
    /// Job failed; reason reported by the service, if any
    Failed(Option<String>),
    /// The service canceled the job
    Canceled,
    /// The attempt ceiling was exhausted without a terminal state
    TimedOut,
}

/// Result of driving a job's polling loop to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Terminal state reached
    pub state: TerminalJobState,
    /// Number of status queries issued
    pub attempts: u32,
}

/// Client for the remote prediction service
#[derive(Debug, Clone)]
pub struct PredictionClient {
    client: Client,
    config: PredictionClientConfig,
}

impl PredictionClient {
    /// Create a client with default configuration
    ///
    /// # Errors
    /// - Failed to create the HTTP client
    pub fn new() -> Result<Self> {
        Self::with_config(PredictionClientConfig::default())
    }

    /// Create a client from an explicit configuration
    ///
    /// # Errors
    /// - Failed to create the HTTP client
    pub fn with_config(config: PredictionClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &PredictionClientConfig {
        &self.config
    }

    /// Create a new prediction job for the given image
    ///
    /// # Errors
    /// - [`RemovalError::Auth`] when the service rejects the credential
    /// - [`RemovalError::RateLimited`] when the service throttles the call
    /// - [`RemovalError::Api`] for any other non-success status
    /// - [`RemovalError::Network`] on transport failures
    pub async fn create_job(
        &self,
        image_bytes: &[u8],
        model_version: &str,
        credential: &Credential,
    ) -> Result<JobHandle> {
        let url = format!("{}/v1/predictions", self.config.base_url);
        let data_uri = encode_data_uri(image_bytes);
        let body = CreatePredictionRequest {
            version: model_version,
            input: PredictionInput { image: &data_uri },
        };

        log::debug!("Creating prediction job ({} image bytes)", image_bytes.len());
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", credential.as_str()),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Prediction creation rejected with HTTP {status}");
            return Err(RemovalError::from_status(status));
        }

        let prediction: PredictionResponse = response.json().await?;
        log::info!("Created prediction job {}", prediction.id);
        Ok(JobHandle { id: prediction.id })
    }

    /// Poll a job until it reaches a terminal state, the attempt ceiling
    /// is exhausted, or the operation is canceled
    ///
    /// The loop only continues across successful non-terminal responses:
    /// any failed status query aborts immediately. A `succeeded` response
    /// without an output value is treated as still in progress. No wait
    /// follows the final attempt.
    ///
    /// # Errors
    /// - [`RemovalError::Canceled`] when the token fires first
    /// - [`RemovalError::Auth`]/[`RemovalError::RateLimited`]/
    ///   [`RemovalError::Api`] on non-success status responses
    /// - [`RemovalError::Network`] on transport failures
    pub async fn poll_job(
        &self,
        handle: &JobHandle,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        for attempt in 1..=self.config.max_poll_attempts {
            let prediction = tokio::select! {
                () = cancel.cancelled() => {
                    log::debug!("Polling of job {} canceled on attempt {attempt}", handle.id());
                    return Err(RemovalError::Canceled);
                },
                result = self.query_status(handle, credential) => result?,
            };

            match prediction.status {
                JobStatus::Succeeded => {
                    if let Some(output) = prediction.output.unwrap_or_default().into_iter().next()
                    {
                        log::info!(
                            "Job {} succeeded after {attempt} status queries",
                            handle.id()
                        );
                        return Ok(PollOutcome {
                            state: TerminalJobState::Succeeded(output),
                            attempts: attempt,
                        });
                    }
                    // Succeeded but no output recorded yet; keep polling
                    log::debug!("Job {} succeeded without output yet", handle.id());
                },
                JobStatus::Failed => {
                    log::warn!(
                        "Job {} failed: {}",
                        handle.id(),
                        prediction.error.as_deref().unwrap_or(UNKNOWN_FAILURE_REASON)
                    );
                    return Ok(PollOutcome {
                        state: TerminalJobState::Failed(prediction.error),
                        attempts: attempt,
                    });
                },
                JobStatus::Canceled => {
                    log::warn!("Job {} was canceled by the service", handle.id());
                    return Ok(PollOutcome {
                        state: TerminalJobState::Canceled,
                        attempts: attempt,
                    });
                },
                JobStatus::Starting | JobStatus::Processing => {
                    log::debug!(
                        "Job {} not finished (attempt {attempt}/{})",
                        handle.id(),
                        self.config.max_poll_attempts
                    );
                },
            }

            // The ceiling counts queries, so the final attempt is not
            // followed by a wait
            if attempt < self.config.max_poll_attempts {
                tokio::select! {
                    () = cancel.cancelled() => {
                        log::debug!("Polling of job {} canceled while waiting", handle.id());
                        return Err(RemovalError::Canceled);
                    },
                    () = tokio::time::sleep(self.config.poll_interval) => {},
                }
            }
        }

        log::warn!(
            "Job {} did not finish within {} status queries",
            handle.id(),
            self.config.max_poll_attempts
        );
        Ok(PollOutcome {
            state: TerminalJobState::TimedOut,
            attempts: self.config.max_poll_attempts,
        })
    }

    /// Issue a single status query for a job
    async fn query_status(
        &self,
        handle: &JobHandle,
        credential: &Credential,
    ) -> Result<PredictionResponse> {
        let url = format!("{}/v1/predictions/{}", self.config.base_url, handle.id());
        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", credential.as_str()),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Status query for job {} returned HTTP {status}", handle.id());
            return Err(RemovalError::from_status(status));
        }

        Ok(response.json().await?)
    }

    /// Download a finished job's output URL into memory
    ///
    /// # Errors
    /// - [`RemovalError::Api`] on a non-success status from the output host
    /// - [`RemovalError::Network`] on transport failures
    pub async fn download_output(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Downloading output from: {url}");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemovalError::from_status(status));
        }

        let mut stream = response.bytes_stream();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            bytes.extend_from_slice(&chunk);
        }

        log::info!("Downloaded {} bytes of processed output", bytes.len());
        Ok(bytes)
    }
}

/// Encode image bytes as a self-contained data URI
///
/// The MIME type is sniffed from the payload; unrecognized data falls
/// back to `application/octet-stream`.
#[must_use]
pub fn encode_data_uri(image_bytes: &[u8]) -> String {
    let mime = image::guess_format(image_bytes)
        .map_or("application/octet-stream", |format| format.to_mime_type());
    format!("data:{mime};base64,{}", STANDARD.encode(image_bytes))
}

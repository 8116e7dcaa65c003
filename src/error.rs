//! Error types for background removal operations

use reqwest::StatusCode;
use thiserror::Error;

use crate::inference::LocalEngineError;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RemovalError>;

/// Unified error taxonomy for both processing backends
///
/// Backend-specific failures are classified into these variants at the
/// backend boundary; callers never see raw transport or engine errors.
#[derive(Error, Debug)]
pub enum RemovalError {
    /// No input image was provided with the request
    #[error("No input image provided")]
    NoInput,

    /// The remote method was selected but no credential is available
    #[error("No API credential configured")]
    MissingCredential,

    /// The prediction service rejected the supplied credential
    #[error("Authentication rejected by the prediction service")]
    Auth,

    /// The prediction service is throttling requests
    #[error("Prediction service rate limit exceeded")]
    RateLimited,

    /// Any other non-success HTTP status from the prediction service
    #[error("Prediction service returned HTTP {0}")]
    Api(StatusCode),

    /// Transport-level failures (DNS, TLS, timeouts, malformed bodies)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote job reached the `failed` state
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    /// The polling ceiling was exhausted without a terminal job state
    #[error("Prediction did not finish within the polling window")]
    PollTimeout,

    /// The injected local inference engine reported a failure
    #[error("Local engine error: {0}")]
    LocalEngine(#[from] LocalEngineError),

    /// The operation was superseded or reset before completing
    ///
    /// Internal outcome: never recorded as a result and never presented.
    #[error("Operation canceled")]
    Canceled,

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new prediction failure error
    pub fn prediction_failed<S: Into<String>>(reason: S) -> Self {
        Self::PredictionFailed(reason.into())
    }

    /// Classify a non-success HTTP status from the prediction service
    ///
    /// 401/403 mean the credential was rejected, 429 means throttling;
    /// everything else is surfaced with its status code.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            other => Self::Api(other),
        }
    }

    /// Whether this error is the internal cancellation marker
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Human-readable message for presenting this error to a user
    ///
    /// Returns `None` for [`RemovalError::Canceled`]: superseded
    /// operations finish silently.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            Self::NoInput => "Please choose an image first.".to_string(),
            Self::MissingCredential => {
                "No API token configured. Add one to use the remote service.".to_string()
            },
            Self::Auth => "The prediction service rejected your API token.".to_string(),
            Self::RateLimited => {
                "The prediction service is rate limiting requests. Try again shortly.".to_string()
            },
            Self::Api(status) => format!(
                "The prediction service returned an unexpected error (HTTP {}).",
                status.as_str()
            ),
            Self::Network(_) => {
                "Could not reach the prediction service. Check your connection.".to_string()
            },
            Self::PredictionFailed(reason) => format!("Background removal failed: {reason}"),
            Self::PollTimeout => {
                "The prediction service took too long to finish. Try again.".to_string()
            },
            Self::LocalEngine(err) => format!("Local processing failed: {err}"),
            Self::InvalidConfig(msg) => format!("Configuration problem: {msg}"),
            Self::Io(err) => format!("File error: {err}"),
            Self::Canceled => return None,
        };
        Some(message)
    }
}

//! Core types for background removal requests and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{RemovalError, Result};

/// Backend selection for a processing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// In-process inference through an injected engine
    Local,
    /// Remote asynchronous prediction service
    Remote,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for Method {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(RemovalError::invalid_config(format!(
                "Unknown processing method: {s}. Valid options: local, remote"
            ))),
        }
    }
}

/// One background removal request
///
/// Immutable once submitted; a new user action means a new request.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    image: Option<Vec<u8>>,
    method: Method,
}

impl ProcessingRequest {
    /// Create a request carrying an image payload
    #[must_use]
    pub fn new(image_bytes: Vec<u8>, method: Method) -> Self {
        Self {
            image: Some(image_bytes),
            method,
        }
    }

    /// Create a request with no image attached
    ///
    /// Processing such a request fails with [`RemovalError::NoInput`];
    /// this mirrors submitting before an upload finished.
    #[must_use]
    pub fn without_image(method: Method) -> Self {
        Self {
            image: None,
            method,
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Image payload, if one was attached and non-empty
    ///
    /// An empty payload counts as no input.
    #[must_use]
    pub fn image_bytes(&self) -> Option<&[u8]> {
        self.image.as_deref().filter(|bytes| !bytes.is_empty())
    }
}

/// Reference to a processed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Output location returned by the prediction service
    Url(String),
    /// Encoded image bytes produced in-process
    Bytes(Vec<u8>),
}

impl ImageRef {
    #[must_use]
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Bytes(_) => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Url(_) => None,
            Self::Bytes(bytes) => Some(bytes),
        }
    }
}

/// Metadata about a completed processing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Total end-to-end wall time in milliseconds
    pub elapsed_ms: u64,

    /// When the operation finished
    pub completed_at: DateTime<Utc>,

    /// Remote job id, when the remote backend ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// Number of status queries issued, when the remote backend ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_count: Option<u32>,
}

impl ProcessingMetadata {
    /// Create new processing metadata
    #[must_use]
    pub fn new(elapsed_ms: u64) -> Self {
        Self {
            elapsed_ms,
            completed_at: Utc::now(),
            job_id: None,
            poll_count: None,
        }
    }

    /// Attach remote job details
    #[must_use]
    pub fn with_job(mut self, job_id: String, poll_count: u32) -> Self {
        self.job_id = Some(job_id);
        self.poll_count = Some(poll_count);
        self
    }
}

/// Successful outcome of a processing request
#[derive(Debug, Clone)]
pub struct ProcessingOutput {
    /// Where the processed image ended up
    pub image: ImageRef,

    /// Which backend produced it
    pub method: Method,

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl ProcessingOutput {
    /// Create a new processing output
    #[must_use]
    pub fn new(image: ImageRef, method: Method, metadata: ProcessingMetadata) -> Self {
        Self {
            image,
            method,
            metadata,
        }
    }

    /// Save byte-backed output to disk
    ///
    /// # Errors
    /// - The output is a remote URL (download it first)
    /// - Filesystem write failures
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match &self.image {
            ImageRef::Bytes(bytes) => {
                std::fs::write(path, bytes)?;
                Ok(())
            },
            ImageRef::Url(url) => Err(RemovalError::invalid_config(format!(
                "Output is a remote URL ({url}); download it before saving"
            ))),
        }
    }
}

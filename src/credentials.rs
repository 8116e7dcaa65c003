//! Credential storage for the remote prediction service
//!
//! The orchestrator only ever asks "is a credential available"; acquiring
//! one (prompting, flags, environment) is the calling layer's job. Stores
//! are deliberately infallible: a broken backing store reads as "no
//! credential" instead of failing the whole operation.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::error::{RemovalError, Result};

/// Name of the single persisted entry
const TOKEN_FILE_NAME: &str = "api_token";

/// Opaque API token for the remote prediction service
///
/// `Debug` output is redacted so the token never reaches logs or panic
/// messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token string
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// The raw token, for building request headers
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// Key-value contract the orchestrator depends on for the remote path
///
/// No retry or network behavior; implementations must be safe to share
/// across tasks.
pub trait CredentialStore: Send + Sync {
    /// Currently stored credential, if any
    fn get(&self) -> Option<Credential>;

    /// Store a credential, replacing any previous one
    fn set(&self, credential: Credential);

    /// Remove the stored credential
    fn clear(&self);
}

/// Process-local credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, credential: Credential) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// File-backed credential store keeping one token per user
///
/// The token lives in a plain file under the user configuration
/// directory:
/// - Linux/macOS: `~/.config/nobg/api_token`
/// - Windows: `%APPDATA%/nobg/api_token`
///
/// The `NOBG_CONFIG_DIR` environment variable overrides the directory.
pub struct FileCredentialStore {
    token_path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at the user configuration directory
    ///
    /// # Errors
    /// - Failed to determine the configuration directory
    /// - Failed to create the configuration directory
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_dir(config_dir))
    }

    /// Create a store rooted at an explicit directory
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            token_path: dir.join(TOKEN_FILE_NAME),
        }
    }

    /// Resolve the configuration directory
    fn get_config_dir() -> Result<PathBuf> {
        // Try environment variable override first
        if let Ok(config_override) = std::env::var("NOBG_CONFIG_DIR") {
            return Ok(PathBuf::from(config_override));
        }

        Ok(dirs::config_dir()
            .ok_or_else(|| {
                RemovalError::invalid_config(
                    "Failed to determine config directory. Set NOBG_CONFIG_DIR environment variable.",
                )
            })?
            .join("nobg"))
    }

    /// Path of the backing token file
    #[must_use]
    pub fn token_path(&self) -> &std::path::Path {
        &self.token_path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<Credential> {
        match fs::read_to_string(&self.token_path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(Credential::new(token))
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::debug!(
                        "Could not read credential file {}: {}",
                        self.token_path.display(),
                        e
                    );
                }
                None
            },
        }
    }

    fn set(&self, credential: Credential) {
        if let Some(parent) = self.token_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!(
                    "Failed to create credential directory {}: {}",
                    parent.display(),
                    e
                );
                return;
            }
        }
        if let Err(e) = fs::write(&self.token_path, credential.as_str()) {
            log::warn!(
                "Failed to persist credential to {}: {}",
                self.token_path.display(),
                e
            );
        }
    }

    fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.token_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "Failed to remove credential file {}: {}",
                    self.token_path.display(),
                    e
                );
            }
        }
    }
}

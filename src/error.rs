//! Error types for the audiobook engine
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (player, download, manifest, storage, etc.)
//! for better error handling and reporting.
//!
//! ## Propagation rules
//!
//! ### Synchronous errors (returned to the caller)
//! - Operations on a closed player, book or task → `IllegalUse`
//! - Manifest hot-replacement rejected → `ManifestMismatch`, `InvalidManifest`
//! - Renderer could not be built in time → `RendererConstructionTimeout`
//! - License verdict negative → `LicenseCheckFailed`
//!
//! ### Asynchronous errors (never returned from transport calls)
//! - Fetch failures → chapter status `Failed` / `Expired`
//! - Cancellation → chapter status `NotDownloaded` (not a failure)
//! - Renderer runtime failures → `PlayerEvent::Error`
//!
//! ### Collaborator errors
//! - HTTP (`reqwest`), JSON (`serde_json`), SQLite (`sqlx`) and I/O errors
//!   convert automatically via `#[from]`

use thiserror::Error;

/// Result type alias using our AudiobookError type
pub type Result<T> = std::result::Result<T, AudiobookError>;

/// Main error type for the engine
///
/// Each variant includes a descriptive message and relevant context.
#[derive(Error, Debug)]
pub enum AudiobookError {
    // ===== Lifecycle Errors =====

    /// Operation attempted on a closed player, book or download task
    #[error("Illegal use: {0} is already closed")]
    IllegalUse(String),

    // ===== Download Errors =====

    /// Download failed and will not recover without intervention
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Download link expired; refreshing the manifest is likely to fix it
    #[error("Download link expired: {0}")]
    DownloadExpired(String),

    /// Download was cancelled (a normal outcome, not a failure)
    #[error("Download cancelled")]
    DownloadCancelled,

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned an unexpected status code
    #[error("Server responded with unexpected status code {status_code} for {url}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    // ===== Manifest Errors =====

    /// Manifest hot-replacement rejected; nothing was mutated
    #[error("Manifest mismatch: {reason}")]
    ManifestMismatch {
        reason: String,
    },

    /// Manifest failed validation
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Requested chapter does not exist in the book
    #[error("Chapter not found: {0}")]
    ChapterNotFound(String),

    // ===== Renderer Errors =====

    /// Renderer construction exceeded its time budget
    #[error("Renderer construction timed out after {0} ms")]
    RendererConstructionTimeout(u64),

    /// Renderer failed while opening, seeking or playing a file
    #[error("Renderer error: {0}")]
    RendererError(String),

    // ===== License Errors =====

    /// A license check refused the book
    #[error("License check '{check}' failed: {reason}")]
    LicenseCheckFailed {
        check: String,
        reason: String,
    },

    // ===== Position Errors =====

    /// Serialized position uses a version this build does not understand
    #[error("Unsupported position format version: {0}")]
    UnsupportedPositionVersion(i64),

    /// Serialized position is malformed
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    // ===== File/Storage Errors =====

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== Configuration Errors =====

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating and classifying errors
impl AudiobookError {
    /// Create an IllegalUse error naming the closed resource
    pub fn illegal_use<S: Into<String>>(resource: S) -> Self {
        AudiobookError::IllegalUse(resource.into())
    }

    /// Create a ManifestMismatch error
    pub fn manifest_mismatch<S: Into<String>>(reason: S) -> Self {
        AudiobookError::ManifestMismatch {
            reason: reason.into(),
        }
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        AudiobookError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        AudiobookError::InternalError(message.into())
    }
}

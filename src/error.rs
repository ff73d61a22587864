//! Error handling module for the Down engine
//!
//! This module defines the error taxonomy for validation, connection,
//! filesystem and registry failures. Transfer-side errors never reach a
//! caller directly: they are captured into the download's
//! [`DownloadStatus::Failed`](crate::DownloadStatus::Failed) reason.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::download::DownloadId;

pub type DownResult<T> = std::result::Result<T, DownError>;

/// Represents errors that can occur while managing downloads
#[derive(Error, Debug)]
pub enum DownError {
    /// The URL was rejected before any task was spawned
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Error occurred during HTTP request/response
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server returned a non-success status code
    #[error("Server error: {status} {message}")]
    ServerError { status: u16, message: String },

    /// The URL scheme passed validation but no transport can fetch it
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Timeout occurred while waiting for the server
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Error occurred during I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Failed to create destination directory
    #[error("Failed to create directory at {path}: {error}")]
    DirectoryCreationFailed { path: PathBuf, error: io::Error },

    /// The server sent more bytes than it announced
    #[error("Received {received} bytes but the server announced {expected}")]
    SizeMismatch { expected: u64, received: u64 },

    /// Download was cancelled by the user
    #[error("Download cancelled")]
    Cancelled,

    /// No download with this id is registered
    #[error("Download {0} not found")]
    NotFound(DownloadId),

    /// The download has not reached a terminal status yet
    #[error("Download {0} is still active")]
    NotTerminal(DownloadId),

    /// Failed to read or write the settings file
    #[error("Settings error: {0}")]
    Settings(String),
}

impl DownError {
    /// Returns true if the error is related to user cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the error happened while talking to the server
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_)
                | Self::ServerError { .. }
                | Self::UnsupportedScheme(_)
                | Self::Timeout(_)
        )
    }

    /// Creates a new server error
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }
}

//! Error handling for logpipe
//!
//! This module provides error types and result aliases for query, index,
//! snapshot and storage operations.

use std::io;
use thiserror::Error;

/// Errors that can occur in logpipe operations
#[derive(Error, Debug)]
pub enum Error {
    /// Query text could not be parsed
    #[error("Parse error at '{token}': {reason}")]
    Parse {
        token: String,
        reason: String,
    },

    /// Two filters could not be merged
    #[error("Conflicting filters: {0}")]
    Conflict(String),

    /// Snapshot was written by an incompatible version
    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        expected: u32,
        found: serde_json::Value,
    },

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to shard operations
    #[error("Shard error: {0}")]
    Shard(String),

    /// Generic error type for other cases
    #[error("{0}")]
    Other(String),
}

/// Result type for logpipe operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new parse error for the offending token or key
    pub fn parse(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a new version mismatch error
    pub fn version_mismatch(expected: u32, found: impl Into<serde_json::Value>) -> Self {
        Self::VersionMismatch { expected, found: found.into() }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new shard error
    pub fn shard(message: impl Into<String>) -> Self {
        Self::Shard(message.into())
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Check if this is a merge conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is a snapshot version mismatch
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if this is a serialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Parse { .. } => Some(
                "Use key=value, key~value or key in (a,b); keys are level, message, search, since, after, before".to_string()
            ),
            Self::Conflict(_) => Some("Remove one of the overlapping level or search filters".to_string()),
            Self::VersionMismatch { .. } => Some("Recreate the snapshot with this version".to_string()),
            Self::Io(err) if err.kind() == io::ErrorKind::NotFound => {
                Some("The specified file or directory does not exist".to_string())
            }
            Self::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Some("You don't have permission to access this file or directory".to_string())
            }
            _ => None,
        }
    }
}

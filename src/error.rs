//! Error types for CloudMove
//!
//! This module defines all error types used throughout the engine,
//! keeping chunk, probe, and property failures distinguishable so the
//! job-tracking layer can report precisely what went wrong.

use crate::properties::PropertyKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for CloudMove operations
#[derive(Error, Debug)]
pub enum CloudMoveError {
    /// I/O error during local file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or remote object not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Existence probe could not be completed (network/auth failure,
    /// distinct from "does not exist")
    #[error("Existence probe of '{location}' could not be completed: {message}")]
    ProbeFailed { location: String, message: String },

    /// A chunk operation failed while moving its byte range
    #[error("Chunk [{offset}, +{length}) failed: {message}")]
    ChunkIo {
        offset: u64,
        length: u64,
        message: String,
    },

    /// Remote transport rejected or failed a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// Destination already exists and the overwrite policy forbids replacing it
    #[error("Destination already exists: {0}")]
    DestinationExists(String),

    /// Caller violated an API contract (e.g. leading bytes set after the
    /// first chunk was invoked, or a second epilogue invocation)
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Source could not supply one specific metadata kind
    #[error("Reading {kind} from source: {message}")]
    PropertyRead { kind: PropertyKind, message: String },

    /// Destination rejected one specific metadata write
    #[error("Writing {kind} to destination: {message}")]
    PropertyWrite { kind: PropertyKind, message: String },

    /// A component of the security descriptor string could not be parsed
    #[error("Parsing {component} of security descriptor: {message}")]
    DescriptorParse { component: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Worker pool error
    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),

    /// Transfer cancelled by the job-tracking layer
    #[error("Transfer cancelled")]
    Cancelled,
}

impl CloudMoveError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a probe error
    pub fn probe(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a chunk I/O error for the given byte range
    pub fn chunk_io(offset: u64, length: u64, message: impl Into<String>) -> Self {
        Self::ChunkIo {
            offset,
            length,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a contract violation error
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    /// Create a property-read error for one metadata kind
    pub fn property_read(kind: PropertyKind, message: impl Into<String>) -> Self {
        Self::PropertyRead {
            kind,
            message: message.into(),
        }
    }

    /// Create a property-write error for one metadata kind
    pub fn property_write(kind: PropertyKind, message: impl Into<String>) -> Self {
        Self::PropertyWrite {
            kind,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if this error is recoverable (could be retried by the
    /// transport collaborator)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Transport(_) | Self::ProbeFailed { .. } | Self::ChunkIo { .. }
        )
    }

    /// True if this error only degrades the result (data already durable)
    pub fn is_degradation(&self) -> bool {
        matches!(
            self,
            Self::PropertyRead { .. } | Self::PropertyWrite { .. } | Self::DescriptorParse { .. }
        )
    }

    /// The property kind involved, if this is a property error
    pub fn property_kind(&self) -> Option<PropertyKind> {
        match self {
            Self::PropertyRead { kind, .. } | Self::PropertyWrite { kind, .. } => Some(*kind),
            Self::DescriptorParse { .. } => Some(PropertyKind::SecurityDescriptor),
            _ => None,
        }
    }

    /// Get the local path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::NotFound(path) => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for CloudMove operations
pub type Result<T> = std::result::Result<T, CloudMoveError>;

impl From<std::io::Error> for CloudMoveError {
    fn from(err: std::io::Error) -> Self {
        CloudMoveError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| CloudMoveError::io(path, e))
    }
}

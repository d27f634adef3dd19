//! Error types for Tapedeck

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Tapedeck operations
pub type Result<T> = std::result::Result<T, TapedeckError>;

/// Errors that can occur in Tapedeck
#[derive(Debug, Error)]
pub enum TapedeckError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid fixture file format
    #[error("Invalid fixture format: {0}")]
    InvalidFormat(String),

    /// Fixture file corrupted (CRC mismatch)
    #[error("Fixture corrupted at offset {offset}: expected CRC {expected:#x}, got {actual:#x}")]
    CorruptedData {
        /// Offset where corruption was detected
        offset: u64,
        /// Expected CRC32 value
        expected: u32,
        /// Actual CRC32 value
        actual: u32,
    },

    /// Fixture file not found
    #[error("Fixture not found: {}", .0.display())]
    FixtureNotFound(PathBuf),

    /// Recorder for a test identity could not be opened
    #[error("Failed to initialize recorder for '{identity}': {source}")]
    RecorderInit {
        /// Test identity
        identity: String,
        /// Underlying failure
        #[source]
        source: Box<TapedeckError>,
    },

    /// Recorded interactions could not be written at teardown
    #[error("Failed to persist fixture for '{identity}': {source}")]
    Persist {
        /// Test identity
        identity: String,
        /// Underlying failure
        #[source]
        source: Box<TapedeckError>,
    },

    /// No recorded interaction matches an outgoing request
    #[error("No recorded interaction matches {method} {url}")]
    InteractionNotFound {
        /// Request method
        method: String,
        /// Request URL
        url: String,
    },

    /// Live transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Recorder was already stopped or discarded
    #[error("Recorder for '{0}' is stopped")]
    RecorderStopped(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request/response or fixture exceeds a configured limit
    #[error("Data too large: {size} exceeds limit of {limit}")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Invalid test name
    #[error("Invalid test name: {0}")]
    InvalidTestName(String),
}

impl TapedeckError {
    /// Wrap an error as a recorder initialization failure
    pub fn recorder_init(identity: &str, source: Self) -> Self {
        Self::RecorderInit {
            identity: identity.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap an error as a persistence failure
    pub fn persist(identity: &str, source: Self) -> Self {
        Self::Persist {
            identity: identity.to_string(),
            source: Box::new(source),
        }
    }

    /// Check whether this error means replay found no matching interaction
    #[must_use]
    pub fn is_match_failure(&self) -> bool {
        matches!(self, Self::InteractionNotFound { .. })
    }
}

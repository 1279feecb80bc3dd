//! Error types for format analysis.
//!
//! Errors fall into three groups: expected domain failures that analyzers
//! translate into node annotations (encryption, malformed containers),
//! unexpected failures that are recorded as diagnostics, and fatal errors
//! (cancellation) that unwind the whole analysis.

use thiserror::Error;

/// Primary error type for format analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// IO error while reading a byte store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Truncated data when reading.
    #[error("Truncated data at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedData {
        /// Where the read started.
        offset: u64,
        /// Bytes the read needed.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Invalid magic bytes for the detected format.
    #[error("Invalid magic bytes: expected {expected}, got {actual}")]
    InvalidMagic {
        /// Magic the format requires.
        expected: String,
        /// Bytes found instead.
        actual: String,
    },

    /// A recognizable container whose structure is broken.
    #[error("Malformed {format} data: {message}")]
    Malformed {
        /// Recognizer name.
        format: &'static str,
        /// What is broken.
        message: String,
    },

    /// Entry content is encrypted and cannot be read.
    #[error("Encrypted content: {path}")]
    Encrypted {
        /// Entry path.
        path: String,
    },

    /// Compression method not supported by the adapter.
    #[error("Unsupported {format} compression method {method}")]
    UnsupportedMethod {
        /// Recognizer name.
        format: &'static str,
        /// Method id as stored in the archive.
        method: u16,
    },

    /// Entry is larger than the configured limit.
    #[error("Entry {path} exceeds size limit: {size} > {limit} bytes")]
    EntryTooLarge {
        /// Entry path.
        path: String,
        /// Declared size.
        size: u64,
        /// Configured `max_entry_size`.
        limit: u64,
    },

    /// Recursion went deeper than the configured limit.
    #[error("Maximum analysis depth {depth} exceeded")]
    DepthExceeded {
        /// Configured `max_depth`.
        depth: usize,
    },

    /// A decoded value was accessed after its owner released it.
    #[error("Decoded value of format {format} was already released")]
    Disposed {
        /// Recognizer name.
        format: &'static str,
    },

    /// A single-pass reader was asked for an entry it has moved past.
    #[error("Archive reader entry {path} is no longer current")]
    EntryConsumed {
        /// Entry path.
        path: String,
    },

    /// Analysis was cancelled.
    #[error("Analysis cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// What is wrong with the options.
        message: String,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Create a malformed-data error for a format.
    pub fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        AnalysisError::Malformed {
            format,
            message: message.into(),
        }
    }

    /// Whether this error must unwind the whole analysis.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }

    /// Whether this error reports encrypted content.
    pub fn is_encryption(&self) -> bool {
        matches!(self, AnalysisError::Encrypted { .. })
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait for adding format context to errors.
pub trait ResultExt<T> {
    /// Wrap a non-fatal error as malformed data of `format`.
    fn context(self, format: &'static str, msg: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, format: &'static str, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            if e.is_fatal() || e.is_encryption() {
                e
            } else {
                AnalysisError::Malformed {
                    format,
                    message: format!("{}: {}", msg.into(), e),
                }
            }
        })
    }
}

impl<T> ResultExt<T> for std::io::Result<T> {
    fn context(self, format: &'static str, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| AnalysisError::Malformed {
            format,
            message: format!("{}: {}", msg.into(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::TruncatedData {
            offset: 16,
            expected: 4,
            actual: 1,
        };
        assert!(err.to_string().contains("16"));
        assert!(err.to_string().contains("4"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AnalysisError::Cancelled.is_fatal());
        assert!(!AnalysisError::malformed("zip", "bad").is_fatal());
        assert!(AnalysisError::Encrypted { path: "a".into() }.is_encryption());
    }

    #[test]
    fn test_context_keeps_encryption() {
        let r: Result<()> = Err(AnalysisError::Encrypted { path: "x".into() });
        let err = r.context("zip", "opening entry").unwrap_err();
        assert!(err.is_encryption());

        let r: Result<()> = Err(AnalysisError::DepthExceeded { depth: 3 });
        let err = r.context("zip", "opening entry").unwrap_err();
        assert!(err.to_string().contains("opening entry"));
    }
}

//! Error types module
//!
//! This module provides the error taxonomy shared by every crisp component.
//! All failures are unified under the `EngineError` enum. Per-image and
//! per-format failures are recorded on the affected result rather than
//! aborting the batch, so most variants are recoverable; only
//! `EncoderUnavailable` is fatal to a whole run.

use std::io;
use std::time::Duration;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like invalid configuration values
    Debug,
    /// Warning level - for recoverable issues like decode failures and limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be reported.
/// Errors self-describe so result records and logs stay consistent.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "DECODE_FAILURE")
    fn error_code(&self) -> &'static str;

    /// Whether the batch can continue past this error
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the caller
    fn suggested_action(&self) -> Option<&'static str>;

    /// Message placed on an error-flagged result
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("Operation '{operation}' timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Resource limit exceeded: {width}x{height} exceeds {limit}")]
    ResourceLimitExceeded {
        width: u32,
        height: u32,
        limit: String,
    },

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn engine_error_static_metadata(
    err: &EngineError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        EngineError::DecodeFailure(_) => (
            "DECODE_FAILURE",
            true,
            Some("Check the source file or convert it to a common format"),
            LogLevel::Warn,
        ),
        EngineError::Timeout { .. } => (
            "TIMEOUT",
            true,
            Some("Retry with a smaller image or a longer timeout"),
            LogLevel::Warn,
        ),
        EngineError::ModelUnavailable(_) => (
            "MODEL_UNAVAILABLE",
            true,
            Some("Processing continues without AI assistance"),
            LogLevel::Warn,
        ),
        EngineError::ResourceLimitExceeded { .. } => (
            "RESOURCE_LIMIT_EXCEEDED",
            true,
            Some("Reduce target dimensions"),
            LogLevel::Warn,
        ),
        EngineError::EncodeFailure(_) => (
            "ENCODE_FAILURE",
            true,
            Some("Try a different output format"),
            LogLevel::Warn,
        ),
        EngineError::EncoderUnavailable(_) => (
            "ENCODER_UNAVAILABLE",
            false,
            Some("The runtime cannot encode images; processing is not possible"),
            LogLevel::Error,
        ),
        EngineError::ResourceBusy(_) => (
            "RESOURCE_BUSY",
            true,
            Some("Retry once in-flight work has finished"),
            LogLevel::Debug,
        ),
        EngineError::InvalidInput(_) => (
            "INVALID_INPUT",
            false,
            Some("Check processing options and try again"),
            LogLevel::Debug,
        ),
        EngineError::Internal(_) | EngineError::InternalWithSource { .. } => (
            "INTERNAL_ERROR",
            true,
            Some("Retry; report the issue if it persists"),
            LogLevel::Error,
        ),
    }
}

impl EngineError {
    /// Get the error type name for detailed reports
    pub fn error_type(&self) -> &str {
        match self {
            EngineError::DecodeFailure(_) => "DecodeFailure",
            EngineError::Timeout { .. } => "Timeout",
            EngineError::ModelUnavailable(_) => "ModelUnavailable",
            EngineError::ResourceLimitExceeded { .. } => "ResourceLimitExceeded",
            EngineError::EncodeFailure(_) => "EncodeFailure",
            EngineError::EncoderUnavailable(_) => "EncoderUnavailable",
            EngineError::ResourceBusy(_) => "ResourceBusy",
            EngineError::InvalidInput(_) => "InvalidInput",
            EngineError::Internal(_) => "Internal",
            EngineError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        EngineError::Timeout { operation, after }
    }
}

impl ErrorMetadata for EngineError {
    fn error_code(&self) -> &'static str {
        engine_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        engine_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        engine_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        engine_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            EngineError::DecodeFailure(ref msg) => format!("Could not decode image: {}", msg),
            EngineError::Timeout { operation, after } => {
                format!("{} did not finish within {}ms", operation, after.as_millis())
            }
            EngineError::ModelUnavailable(_) => "AI model is not available".to_string(),
            EngineError::ResourceLimitExceeded {
                width,
                height,
                limit,
            } => format!("{}x{} exceeds the {}", width, height, limit),
            EngineError::EncodeFailure(ref msg) => format!("Could not encode image: {}", msg),
            EngineError::EncoderUnavailable(_) => "Image encoding is not supported".to_string(),
            EngineError::ResourceBusy(ref msg) => msg.clone(),
            EngineError::InvalidInput(ref msg) => msg.clone(),
            EngineError::Internal(_) | EngineError::InternalWithSource { .. } => {
                "Internal processing error".to_string()
            }
        }
    }
}

/// Shorthand for results carrying an `EngineError`
pub type EngineResult<T> = Result<T, EngineError>;

//! Error types for sensorstream
//!
//! Ingestion, buffering and flushing never fail: malformed input is recovered
//! as a best-effort reading and invalid mutations are no-ops. The errors below
//! only surface from configuration, session lifecycle and the strict
//! decimation entry point.

use thiserror::Error;

/// Result type alias for sensorstream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for sensorstream operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session lifecycle error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Decimation error
    #[error("Decimation error: {0}")]
    Decimation(#[from] DecimationError),
}

/// Errors in configuration values or files
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric option is out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Configuration text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration file could not be read
    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Errors reported by a transport collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection failed: {reason}")]
    ConnectFailed { reason: String },

    /// Transport was already connected to another sink
    #[error("Transport already connected")]
    AlreadyConnected,
}

/// Errors in the stream session lifecycle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// `start` was called on a running session
    #[error("Session already running")]
    AlreadyRunning,

    /// No tokio runtime available to spawn the session timers
    #[error("No async runtime: {0}")]
    NoRuntime(String),
}

/// Errors from the strict decimation entry point
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecimationError {
    /// Target size of zero
    #[error("Target size must be at least 1")]
    ZeroTarget,

    /// LTTB needs room for both endpoints plus one bucket
    #[error("LTTB requires a target size of at least 3, got {target_size}")]
    TargetTooSmallForLttb { target_size: usize },

    /// Values and labels differ in length
    #[error("Label count {labels} does not match value count {values}")]
    LabelMismatch { values: usize, labels: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::Decimation(DecimationError::TargetTooSmallForLttb { target_size: 2 });
        let msg = format!("{}", err);
        assert!(msg.contains("LTTB"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::InvalidValue {
            field: "buffer_capacity",
            reason: "must be greater than zero".to_string(),
        };
        let err: StreamError = config_err.into();
        assert!(matches!(err, StreamError::Config(_)));

        let err: StreamError = SessionError::AlreadyRunning.into();
        assert!(matches!(err, StreamError::Session(SessionError::AlreadyRunning)));
    }
}

//! Custom error types for the application.
//!
//! This module defines the primary error type, `RoverError`, for the entire
//! pipeline. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure classes the system
//! distinguishes:
//!
//! - **`Config` / `Configuration`**: parse errors from the `config` crate vs.
//!   semantic errors caught during validation (a value that parsed fine but is
//!   logically wrong, e.g. a ring with fewer than two slots).
//! - **`Io` / `Transport`**: raw I/O failures vs. failures attributed to the
//!   trainer connection. A transport failure aborts the in-flight exchange
//!   only; the scheduler resumes producers and keeps the trial running.
//! - **`MalformedHeader`**: the trainer sent a frame whose JSON header does
//!   not parse or declares an insane length. This is a hard error for that
//!   exchange rather than a silent stall of the read state machine.
//! - **`PermissionDenied`**: a producer's capability request was denied or
//!   timed out. Terminal for that producer, never for the pipeline.
//! - **`Precondition` / `LifecycleStarted`**: expected misuse signalled as
//!   values (e.g. registering a producer after bring-up), as opposed to
//!   invariant violations, which panic.
//!
//! By using `#[from]`, `RoverError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the crate with the `?`
//! operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, RoverError>;

/// Unified error type for the aggregation and transport pipeline.
#[derive(Error, Debug)]
pub enum RoverError {
    /// Configuration file could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// General I/O failure outside the trainer connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect, read or write failure on the trainer socket. Fatal for the
    /// in-flight exchange; the episode payload for that cycle is lost.
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON (de)serialization failure for frame headers.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The trainer's JSON frame header failed to parse or declared a length
    /// beyond the configured cap.
    #[error("Malformed frame header: {0}")]
    MalformedHeader(String),

    /// No response arrived within the configured round-trip window.
    #[error("Trainer response timed out after {0:?}")]
    ResponseTimeout(std::time::Duration),

    /// A producer's permission request was denied (or timed out).
    ///
    /// Reserved for `Producer` and `PermissionBroker` implementations whose
    /// underlying platform reports denial as an error (e.g. a capture stream
    /// that fails to open for lack of a grant). The lifecycle coordinator
    /// itself tracks denial as per-producer state and treats any such error
    /// from `start()` as an exclusion, never a pipeline failure.
    #[error("Permission denied for producer '{0}'")]
    PermissionDenied(String),

    /// An operation was requested in a state that does not allow it.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Producer registration attempted after the lifecycle left the
    /// registration phase.
    #[error("Producer '{0}' registered after lifecycle bring-up")]
    LifecycleStarted(String),

    /// An internal channel closed unexpectedly (peer task exited).
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_message_includes_cause() {
        let err = RoverError::Transport("connection reset by peer".into());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: RoverError = io.into();
        assert!(matches!(err, RoverError::Io(_)));
    }
}

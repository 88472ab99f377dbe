//! Error types for funcwire.
//!
//! - [`FuncwireError`] covers the transport and start-up path.
//! - [`InvokeError`] is what a [`Handler`](crate::handler::Handler) returns
//!   for a single invocation.
//! - [`ConfigError`] describes a handler that cannot be invoked at all. It is
//!   never raised at start-up; the normalized handler returns it on every call.
//! - [`BodyError`] is a request body that could not be read in full.

use thiserror::Error;

/// Boxed error accepted from user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for transport and start-up operations.
#[derive(Debug, Error)]
pub enum FuncwireError {
    /// I/O error on the listening socket or a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed FastCGI traffic.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid start-up configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection writer is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The inherited file descriptor is not a listening socket we can use.
    #[error("Unsupported listener: {0}")]
    UnsupportedListener(String),
}

/// Result type alias using FuncwireError.
pub type Result<T> = std::result::Result<T, FuncwireError>;

/// A handler whose shape cannot be invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("handler is nil")]
    NilHandler,

    #[error("handler kind {kind} is not func")]
    NotAFunction { kind: String },

    #[error("handlers may not take more than two arguments, but handler takes {count}")]
    TooManyArguments { count: usize },

    #[error("handler takes two arguments, but the first is not Context. got {got}")]
    FirstArgumentNotContext { got: String },

    #[error("handler event argument must be decodable, but got Context")]
    ContextAsEvent,

    #[error("handler may not return more than two values")]
    TooManyReturns { count: usize },

    #[error("handler returns two values, but the second does not implement error")]
    SecondReturnNotError,

    #[error("handler returns a single value, but it does not implement error")]
    SingleReturnNotError,
}

/// Failure to read a request body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    /// The host aborted the request or the connection failed mid-body.
    #[error("request body aborted: {0}")]
    Aborted(String),

    /// The body stream was dropped before its end marker.
    #[error("request body ended unexpectedly")]
    Truncated,
}

/// Failure of a single invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The handler was rejected during normalization.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The payload is not valid JSON for the event type.
    #[error("{0}")]
    Decode(#[source] serde_json::Error),

    /// The handler takes an event but the payload holds no JSON value.
    #[error("EOF")]
    EmptyPayload,

    /// The returned value cannot be represented as JSON.
    #[error("{0}")]
    Encode(#[source] serde_json::Error),

    /// A dynamically described callable received an argument it cannot use.
    #[error("handler argument mismatch: expected {expected}")]
    ArgumentMismatch { expected: &'static str },

    /// A dynamically described callable returned a different number of
    /// values than its signature declares.
    #[error("handler declared {expected} return values, but returned {got}")]
    ReturnMismatch { expected: usize, got: usize },

    /// The handler's own error, displayed verbatim.
    #[error("{0}")]
    Handler(BoxError),
}

impl InvokeError {
    /// Wrap any error produced by user code.
    pub fn handler<E: Into<BoxError>>(err: E) -> Self {
        Self::Handler(err.into())
    }

    /// Whether this error comes from a rejected handler shape.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_displays_verbatim() {
        let err = InvokeError::handler("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_config());
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = InvokeError::from(ConfigError::TooManyArguments { count: 3 });
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "handlers may not take more than two arguments, but handler takes 3"
        );
    }

    #[test]
    fn test_not_a_function_message() {
        let err = ConfigError::NotAFunction {
            kind: "u32".to_string(),
        };
        assert_eq!(err.to_string(), "handler kind u32 is not func");
    }
}

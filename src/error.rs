//! Error types for the Quicksilver deferred value runtime
//!
//! Errors raised by initializers, handlers and foreign thenables never escape
//! the runtime: each one is turned into the rejection reason of exactly one
//! [`Deferred`](crate::Deferred) through [`Error::into_reason`].

use crate::runtime::Value;
use std::fmt;
use thiserror::Error;

/// Main error type for Quicksilver promises
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// A value raised by user code (an initializer, handler or thenable)
    #[error("Uncaught {0}")]
    Thrown(Value),

    /// Runtime error - TypeError, CycleError, etc.
    #[error("{kind}: {message}")]
    RuntimeError { kind: ErrorKind, message: String },

    /// Internal runtime error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Invalid event loop configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),
}

/// JavaScript-style error kinds carried by rejection reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ErrorKind {
    /// TypeError - wrong type for operation
    TypeError,
    /// CycleError - a deferred value was asked to adopt itself
    CycleError,
    /// Generic Error - user-raised errors
    GenericError,
    /// InternalError - internal runtime error
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::CycleError => write!(f, "CycleError"),
            ErrorKind::GenericError => write!(f, "Error"),
            ErrorKind::InternalError => write!(f, "InternalError"),
        }
    }
}

impl Error {
    /// Raise an arbitrary value, the way `throw value` would
    pub fn thrown(value: impl Into<Value>) -> Self {
        Error::Thrown(value.into())
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::TypeError,
            message: message.into(),
        }
    }

    /// Create the error used when a deferred value would adopt itself
    pub fn cycle_detected(id: u64) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::CycleError,
            message: messages::chaining_cycle(id),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigError(message.into())
    }

    /// Convert this error into the value a deferred value is rejected with.
    ///
    /// A thrown value is passed through untouched so that rethrowing a reason
    /// preserves its identity. Every other error becomes an error object with
    /// `name` and `message` properties.
    pub fn into_reason(self) -> Value {
        match self {
            Error::Thrown(value) => value,
            Error::RuntimeError { kind, message } => Value::new_error(&kind.to_string(), &message),
            Error::InternalError(message) => {
                Value::new_error(&ErrorKind::InternalError.to_string(), &message)
            }
            other => Value::new_error(&ErrorKind::GenericError.to_string(), &other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

/// Result type alias for Quicksilver promises
pub type Result<T> = std::result::Result<T, Error>;

/// Standardized error message templates
pub mod messages {
    pub const NOT_A_FUNCTION: &str = "is not a function";
    pub const CHAINING_CYCLE: &str = "Chaining cycle detected for deferred";
    pub const MUST_BE_POSITIVE: &str = "must be greater than zero";

    /// Format a "X is not a function" error message
    pub fn not_a_function(name: &str) -> String {
        format!("'{}' {}", name, NOT_A_FUNCTION)
    }

    /// Format the self-adoption message for a deferred value
    pub fn chaining_cycle(id: u64) -> String {
        format!("{} #{}", CHAINING_CYCLE, id)
    }

    /// Format a "X must be greater than zero" error message
    pub fn must_be_positive(what: &str) -> String {
        format!("{} {}", what, MUST_BE_POSITIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_value_is_reason() {
        let reason = Error::thrown("boom").into_reason();
        assert_eq!(reason, Value::from("boom"));
    }

    #[test]
    fn test_cycle_error_reason() {
        let reason = Error::cycle_detected(7).into_reason();
        assert_eq!(reason.error_name().as_deref(), Some("CycleError"));
        assert_eq!(
            reason.get("message").unwrap(),
            Value::from("Chaining cycle detected for deferred #7")
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::type_error("'x' is not a function");
        assert_eq!(err.to_string(), "TypeError: 'x' is not a function");
        assert_eq!(err.into_reason().error_name().as_deref(), Some("TypeError"));
        assert_eq!(Error::thrown(1).to_string(), "Uncaught 1");
    }

    #[test]
    fn test_config_error_from_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::ConfigError(_)));
        assert_eq!(err.into_reason().error_name().as_deref(), Some("Error"));
    }

    #[test]
    fn test_internal_error_reason() {
        let reason = Error::InternalError("queue poisoned".to_string()).into_reason();
        assert_eq!(reason.error_name().as_deref(), Some("InternalError"));
        assert_eq!(reason.get("message").unwrap(), Value::from("queue poisoned"));
    }
}

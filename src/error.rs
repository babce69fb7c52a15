//! Error types for the enclosure bridge.
//!
//! Only configuration and hardware setup can fail hard. Failed HTTP requests
//! to the enclosure are reported through [`crate::sender::SendOutcome`]
//! instead and never surface here.

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("Invalid value '{value}' for '{var_name}': {reason}")]
    InvalidValue {
        var_name: String,
        value: String,
        reason: String,
    },

    /// The HTTP client could not be built from the configuration.
    #[error("Failed to build HTTP client: {reason}")]
    HttpClient { reason: String },
}

/// Errors returned to callers of the command API.
#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    /// The caller is not allowed to control the enclosure.
    #[error("permission denied")]
    PermissionDenied,

    /// The request named a command the API does not know.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

/// Errors from GPIO pin access.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Failed to {action} GPIO pin {pin}: {source}")]
    Io {
        pin: u32,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
}

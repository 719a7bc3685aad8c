//! Error types for provider calls.

use thiserror::Error;

/// Errors raised while talking to the capability provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    /// Raised when the provider answers with a non-success status.
    #[error("{method} {path} failed with status {status}: {body}")]
    CallFailed {
        /// HTTP method of the failed call.
        method: String,
        /// Provider-relative path.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Response body returned by the provider.
        body: String,
    },
    /// Raised when the request never produced a response.
    #[error("{method} {path} could not be completed: {message}")]
    Transport {
        /// HTTP method of the failed call.
        method: String,
        /// Provider-relative path.
        path: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when a success response does not match the expected shape.
    #[error("failed to decode {path} response: {message}")]
    Decode {
        /// Provider-relative path.
        path: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when a single-instance launch does not return exactly one id.
    #[error("launch returned {count} instance ids, expected exactly 1")]
    UnexpectedLaunchCount {
        /// Number of ids returned.
        count: usize,
    },
    /// Raised when an instance has no IP address yet.
    #[error("instance {instance_id} has no IP address")]
    MissingIp {
        /// Provider instance identifier.
        instance_id: String,
    },
}

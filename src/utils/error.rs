//! The `error` module defines the error types used across `pubsub_client`.
//!
//! Failures that happen before any network interaction (payload encoding,
//! misuse of a service) surface as [`PubSubError`] to the immediate caller.
//! Failures reported by the transport are carried as [`TransportError`] and
//! wrapped unchanged.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, PubSubError>;

/// Error type returned by the publish, subscribe and lifecycle APIs.
#[derive(Error, Debug)]
pub enum PubSubError {
    /// The payload kind cannot be turned into transport bytes.
    #[error("unsupported payload type: {0}")]
    UnsupportedPayloadType(String),

    /// The transport rejected or failed the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The publish was cancelled before the transport committed it.
    #[error("operation was cancelled")]
    Cancelled,

    /// A lifecycle operation was invoked in a state that does not allow it.
    #[error("invalid state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: String,
    },

    /// The receive loop of a subscription channel terminated abnormally.
    #[error("subscription channel failed: {0}")]
    Channel(String),

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

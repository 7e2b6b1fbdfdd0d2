//! The `transport` module defines the boundary between this client layer and
//! the messaging backend.
//!
//! The backend itself is an external collaborator. This module only fixes the
//! contract the rest of the crate relies on:
//! - admin calls (`create_topic`, `get_topic`, `create_subscription`)
//! - `publish`, which returns a one-shot [`CompletionHandle`] resolved on
//!   transport-owned tasks
//! - `subscribe`, which yields a stream of [`RawDelivery`] values that carry
//!   their own acknowledgment capability
//!
//! [`crate::broker::Broker`] is the in-process implementation.

pub mod completion;
pub mod message;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

pub use completion::{Completion, CompletionHandle};
pub use message::{AckReplier, Attributes, OutboundMessage, RawDelivery};

/// Stream of deliveries for one subscription. Dropping it detaches the
/// receiver from the transport.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<RawDelivery, TransportError>> + Send>>;

/// Errors raised by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Creation calls treat this error as idempotent success.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, TransportError::AlreadyExists(_))
    }
}

/// A publish/subscribe backend.
///
/// Resource names are fully qualified (`projects/{p}/topics/{t}`,
/// `projects/{p}/subscriptions/{s}`). Implementations resolve completions and
/// produce deliveries on their own tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates a topic and returns its name.
    async fn create_topic(&self, topic: &str) -> Result<String, TransportError>;

    /// Looks up a topic and returns its name.
    async fn get_topic(&self, topic: &str) -> Result<String, TransportError>;

    /// Creates a subscription attached to `topic` and returns its name.
    async fn create_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<String, TransportError>;

    /// Submits a message. Never blocks; the outcome is reported through the
    /// returned handle.
    fn publish(&self, topic: &str, message: OutboundMessage) -> CompletionHandle;

    /// Opens a receive stream on a subscription.
    async fn subscribe(&self, subscription: &str) -> Result<DeliveryStream, TransportError>;
}

#[cfg(test)]
mod tests;

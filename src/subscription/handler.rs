use std::future::Future;

use async_trait::async_trait;

use crate::subscription::message::DeliveredMessage;

/// Error a handler may return. It is logged; the message stays unacked.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// `Ok(true)` acks the message. Anything else leaves it for redelivery.
pub type HandlerResult = Result<bool, HandlerError>;

/// Processes delivered messages.
///
/// Invocations may run concurrently (up to the channel's `max_outstanding`),
/// so implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: DeliveredMessage) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(DeliveredMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, message: DeliveredMessage) -> HandlerResult {
        (self)(message).await
    }
}

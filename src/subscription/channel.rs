//! Subscription channel
//!
//! Opening a channel attaches to the transport's receive stream and spawns a
//! receive loop. For every delivery the loop decodes the payload, invokes the
//! handler on its own task and applies the acknowledgment policy:
//! - no handler: ack on receipt
//! - handler returns `Ok(true)`: ack
//! - `Ok(false)`, `Err(_)` or a panic: leave unacked so the transport
//!   redelivers it
//!
//! Closing stops the loop from taking new deliveries, detaches from the
//! stream and waits for in-flight handlers. [`ChannelHandle::wait`] returns
//! only after that drain is complete.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::subscription::handler::MessageHandler;
use crate::subscription::message::DeliveredMessage;
use crate::transport::{DeliveryStream, RawDelivery, Transport, TransportError};
use crate::utils::error::{PubSubError, Result};

/// Per-channel delivery counters, reported once the channel has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub received: u64,
    pub acked: u64,
    /// The handler returned `Ok(false)`.
    pub declined: u64,
    /// The handler returned an error or panicked.
    pub failed: u64,
}

impl ChannelStats {
    pub fn unacked(&self) -> u64 {
        self.declined + self.failed
    }

    fn record(&mut self, joined: std::result::Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Acked) => self.acked += 1,
            Ok(Outcome::Declined) => self.declined += 1,
            Ok(Outcome::Failed) => self.failed += 1,
            Err(err) => {
                error!(error = %err, "message handler panicked, message left unacked");
                self.failed += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Acked,
    Declined,
    Failed,
}

/// A not-yet-opened subscription channel. Consumed by [`open`](Self::open),
/// so one channel backs at most one receive loop.
pub struct SubscriptionChannel {
    transport: Arc<dyn Transport>,
    subscription: String,
    max_outstanding: usize,
}

impl SubscriptionChannel {
    pub fn new(
        transport: Arc<dyn Transport>,
        subscription: impl Into<String>,
        max_outstanding: usize,
    ) -> Self {
        Self {
            transport,
            subscription: subscription.into(),
            max_outstanding: max_outstanding.max(1),
        }
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Attaches to the subscription and starts the receive loop.
    pub async fn open(self, handler: Option<Arc<dyn MessageHandler>>) -> Result<ChannelHandle> {
        let stream = self.transport.subscribe(&self.subscription).await?;
        info!(subscription = %self.subscription, max_outstanding = self.max_outstanding, "subscription channel opened");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(receive_loop(
            self.subscription.clone(),
            stream,
            handler,
            self.max_outstanding,
            cancel.clone(),
        ));

        Ok(ChannelHandle {
            subscription: self.subscription,
            cancel,
            task: Some(task),
        })
    }
}

impl std::fmt::Debug for SubscriptionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionChannel")
            .field("subscription", &self.subscription)
            .field("max_outstanding", &self.max_outstanding)
            .finish()
    }
}

/// Handle to an open channel.
///
/// Dropping the handle closes the channel without waiting for the drain.
#[derive(Debug)]
pub struct ChannelHandle {
    subscription: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<ChannelStats>>>,
}

impl ChannelHandle {
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Stops taking new deliveries. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!(subscription = %self.subscription, "close subscription channel");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once [`wait`](Self::wait) has returned the drain result.
    pub fn is_drained(&self) -> bool {
        self.task.is_none()
    }

    /// Waits for the receive loop to finish and all in-flight handlers to
    /// complete. The result is handed out once; later calls fail with
    /// `InvalidState`.
    ///
    /// Cancel-safe: if the returned future is dropped early, `wait` can be
    /// called again.
    pub async fn wait(&mut self) -> Result<ChannelStats> {
        let Some(task) = self.task.as_mut() else {
            return Err(PubSubError::InvalidState {
                expected: "open channel",
                found: "drained channel".to_string(),
            });
        };

        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(err) => Err(PubSubError::Channel(err.to_string())),
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    subscription: String,
    mut stream: DeliveryStream,
    handler: Option<Arc<dyn MessageHandler>>,
    max_outstanding: usize,
    cancel: CancellationToken,
) -> Result<ChannelStats> {
    let permits = Arc::new(Semaphore::new(max_outstanding));
    let mut in_flight = JoinSet::new();
    let mut stats = ChannelStats::default();
    let mut failure = None;

    loop {
        while let Some(joined) = in_flight.try_join_next() {
            stats.record(joined);
        }

        // Take a permit before pulling, so at most `max_outstanding`
        // deliveries are held by this channel at once.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(delivery)) => {
                stats.received += 1;
                let handler = handler.clone();
                in_flight.spawn(async move {
                    let outcome = process(delivery, handler).await;
                    drop(permit);
                    outcome
                });
            }
            Some(Err(err)) => {
                error!(%subscription, error = %err, "receive stream failed");
                failure = Some(err);
                break;
            }
            None => {
                warn!(%subscription, "receive stream ended unexpectedly");
                failure = Some(TransportError::Closed);
                break;
            }
        }
    }

    // Detach first so nothing new is delivered, then let handlers finish.
    drop(stream);
    let pending = in_flight.len();
    if pending > 0 {
        debug!(%subscription, pending, "waiting for in-flight deliveries");
    }
    while let Some(joined) = in_flight.join_next().await {
        stats.record(joined);
    }
    info!(
        %subscription,
        received = stats.received,
        acked = stats.acked,
        unacked = stats.unacked(),
        "subscription channel drained"
    );

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(stats),
    }
}

async fn process(delivery: RawDelivery, handler: Option<Arc<dyn MessageHandler>>) -> Outcome {
    info!(
        message_id = %delivery.message_id,
        publish_time = %delivery.publish_time,
        attempt = delivery.delivery_attempt,
        "message has been received"
    );

    let Some(handler) = handler else {
        delivery.ack();
        return Outcome::Acked;
    };

    let message = DeliveredMessage::from_raw(&delivery);
    debug!(?message, "message content");

    match handler.handle(message).await {
        Ok(true) => {
            delivery.ack();
            Outcome::Acked
        }
        Ok(false) => {
            debug!(message_id = %delivery.message_id, "handler did not ack, leaving message for redelivery");
            Outcome::Declined
        }
        Err(err) => {
            error!(message_id = %delivery.message_id, error = %err, "message handler failed, message left unacked");
            Outcome::Failed
        }
    }
}

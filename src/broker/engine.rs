//! Broker engine
//!
//! This module contains the in-process transport responsible for:
//! - managing topics and the subscriptions attached to them
//! - committing published messages and fanning them out to every subscription
//! - tracking in-flight deliveries until they are acked
//! - redelivering deliveries whose ack deadline expired, up to a capped
//!   number of attempts
//!
//! Concurrency and usage notes:
//! - All state sits behind one mutex. It is never held across an `.await`.
//! - `publish` resolves its completion handle on a spawned task, so it must be
//!   called from within a Tokio runtime.
//! - Only one receive stream per subscription is attached at a time; a new
//!   `subscribe` call ends the previous stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broker::message::StoredMessage;
use crate::broker::subscription::{SubscriptionQueue, SubscriptionStats};
use crate::broker::topic::Topic;
use crate::config::BrokerSettings;
use crate::transport::{
    AckReplier, Completion, CompletionHandle, DeliveryStream, OutboundMessage, Transport,
    TransportError,
};

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    subscriptions: HashMap<String, SubscriptionQueue>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BrokerState>,
    settings: BrokerSettings,
    available: AtomicBool,
    published: AtomicU64,
    next_stream_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process publish/subscribe backend. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct Broker {
    shared: Arc<Shared>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                settings,
                available: AtomicBool::new(true),
                published: AtomicU64::new(0),
                next_stream_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.shared.settings
    }

    /// Makes every subsequent call fail with `Unavailable` (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Number of messages committed so far.
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::SeqCst)
    }

    pub fn subscription_stats(&self, subscription: &str) -> Option<SubscriptionStats> {
        self.shared
            .lock()
            .subscriptions
            .get(subscription)
            .map(SubscriptionQueue::stats)
    }

    /// Ends every attached receive stream with `TransportError::Closed`.
    pub fn disconnect_all(&self) {
        let mut state = self.shared.lock();
        for queue in state.subscriptions.values_mut() {
            queue.disconnect(TransportError::Closed);
        }
        info!("all receive streams disconnected");
    }

    /// Requeues deliveries whose ack deadline expired and pushes them to the
    /// attached receivers. Returns how many deliveries were sent.
    pub fn redeliver_expired(&self) -> usize {
        let settings = &self.shared.settings;
        let now = Instant::now();
        let mut state = self.shared.lock();

        let mut sent = 0;
        for queue in state.subscriptions.values_mut() {
            let dropped = queue.expire(now, settings.ack_deadline(), settings.max_delivery_attempts);
            for message_id in dropped {
                error!(
                    subscription = %queue.name,
                    %message_id,
                    attempts = settings.max_delivery_attempts,
                    "message dropped after reaching the delivery attempt cap"
                );
            }
            let replier = self.replier(&queue.name);
            sent += queue.dispatch(&replier);
        }

        if sent > 0 {
            debug!(redelivered = sent, "expired deliveries sent again");
        }
        sent
    }

    /// Runs [`Broker::redeliver_expired`] periodically until `cancel` fires.
    pub fn spawn_redelivery_loop(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let broker = self.clone();
        let period = self.shared.settings.redelivery_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        broker.redeliver_expired();
                    }
                }
            }
            debug!("redelivery loop stopped");
        })
    }

    fn ensure_available(&self) -> Result<(), TransportError> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Unavailable("broker is not reachable".to_string()))
        }
    }

    fn replier(&self, subscription: &str) -> Arc<dyn AckReplier> {
        Arc::new(BrokerAcker {
            shared: Arc::downgrade(&self.shared),
            subscription: subscription.to_string(),
        })
    }

    /// Validates and commits a publish, resolving `completion` under the lock
    /// so a concurrent cancel either wins before the commit or not at all.
    fn commit(&self, topic: &str, message: OutboundMessage, completion: &CompletionHandle) {
        if let Err(err) = self.ensure_available() {
            completion.resolve(Completion::Failed(err));
            return;
        }

        let mut guard = self.shared.lock();
        let state = &mut *guard;

        let Some(target) = state.topics.get(topic) else {
            completion.resolve(Completion::Failed(TransportError::NotFound(topic.to_string())));
            return;
        };
        if message.is_empty() {
            completion.resolve(Completion::Failed(TransportError::InvalidArgument(
                "message must contain data or at least one attribute".to_string(),
            )));
            return;
        }

        let stored = StoredMessage::new(topic, message);
        let message_id = stored.message_id.clone();
        if !completion.resolve(Completion::Published(message_id.clone())) {
            debug!(topic, "publish cancelled before commit");
            return;
        }

        let mut fanned_out = 0;
        for name in &target.subscriptions {
            if let Some(queue) = state.subscriptions.get_mut(name) {
                queue.enqueue(stored.clone());
                queue.dispatch(&self.replier(name));
                fanned_out += 1;
            }
        }
        self.shared.published.fetch_add(1, Ordering::SeqCst);
        debug!(topic, %message_id, subscriptions = fanned_out, "message committed");
    }
}

#[async_trait]
impl Transport for Broker {
    async fn create_topic(&self, topic: &str) -> Result<String, TransportError> {
        self.ensure_available()?;
        let mut state = self.shared.lock();
        if state.topics.contains_key(topic) {
            return Err(TransportError::AlreadyExists(topic.to_string()));
        }
        state.topics.insert(topic.to_string(), Topic::new(topic));
        info!(topic, "topic created");
        Ok(topic.to_string())
    }

    async fn get_topic(&self, topic: &str) -> Result<String, TransportError> {
        self.ensure_available()?;
        let state = self.shared.lock();
        state
            .topics
            .get(topic)
            .map(|t| t.name.clone())
            .ok_or_else(|| TransportError::NotFound(topic.to_string()))
    }

    async fn create_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<String, TransportError> {
        self.ensure_available()?;
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        let Some(target) = state.topics.get_mut(topic) else {
            return Err(TransportError::NotFound(topic.to_string()));
        };
        if state.subscriptions.contains_key(subscription) {
            return Err(TransportError::AlreadyExists(subscription.to_string()));
        }

        target.attach(subscription.to_string());
        state.subscriptions.insert(
            subscription.to_string(),
            SubscriptionQueue::new(subscription, topic),
        );
        info!(subscription, topic, "subscription created");
        Ok(subscription.to_string())
    }

    fn publish(&self, topic: &str, message: OutboundMessage) -> CompletionHandle {
        let completion = CompletionHandle::new();
        let broker = self.clone();
        let resolver = completion.clone();
        let topic = topic.to_string();
        let latency = self.shared.settings.publish_latency();

        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if resolver.is_done() {
                debug!(%topic, "publish cancelled before commit");
                return;
            }
            broker.commit(&topic, message, &resolver);
        });

        completion
    }

    async fn subscribe(&self, subscription: &str) -> Result<DeliveryStream, TransportError> {
        self.ensure_available()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let stream_id = self.shared.next_stream_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut state = self.shared.lock();
            let queue = state
                .subscriptions
                .get_mut(subscription)
                .ok_or_else(|| TransportError::NotFound(subscription.to_string()))?;
            queue.attach(stream_id, sender);
            queue.dispatch(&self.replier(subscription));
        }
        debug!(subscription, stream_id, "receive stream attached");

        let guard = StreamGuard {
            shared: Arc::downgrade(&self.shared),
            subscription: subscription.to_string(),
            stream_id,
        };
        let stream = futures::stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
            receiver
                .recv()
                .await
                .map(|delivery| (delivery, (receiver, guard)))
        });
        Ok(Box::pin(stream))
    }
}

struct BrokerAcker {
    shared: Weak<Shared>,
    subscription: String,
}

impl AckReplier for BrokerAcker {
    fn ack(&self, ack_id: &str) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut state = shared.lock();
        let acked = state
            .subscriptions
            .get_mut(&self.subscription)
            .is_some_and(|queue| queue.ack(ack_id));
        if acked {
            debug!(subscription = %self.subscription, ack_id, "ack received");
        } else {
            debug!(subscription = %self.subscription, ack_id, "ack for unknown or expired delivery");
        }
    }
}

/// Detaches the receiver when the delivery stream is dropped.
struct StreamGuard {
    shared: Weak<Shared>,
    subscription: String,
    stream_id: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut state = shared.lock();
        if let Some(queue) = state.subscriptions.get_mut(&self.subscription) {
            queue.detach(self.stream_id);
        }
        debug!(subscription = %self.subscription, stream_id = self.stream_id, "receive stream detached");
    }
}

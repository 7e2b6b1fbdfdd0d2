//! Per-subscription delivery queue
//!
//! Each subscription owns a backlog of messages waiting for a receiver and a
//! table of in-flight deliveries keyed by ack id. A delivery leaves the
//! in-flight table either when it is acked or when its ack deadline expires,
//! in which case it goes back to the backlog until the attempt cap is hit.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::broker::message::StoredMessage;
use crate::transport::{AckReplier, RawDelivery, TransportError};

pub(crate) type DeliverySender = UnboundedSender<Result<RawDelivery, TransportError>>;

/// Counters exposed for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Messages waiting for a receiver.
    pub backlog: usize,
    /// Delivered and neither acked nor expired.
    pub outstanding: usize,
    pub delivered: u64,
    pub acked: u64,
    /// Deliveries whose ack deadline expired and were queued again.
    pub redelivered: u64,
    /// Messages discarded after reaching the delivery attempt cap.
    pub dropped: u64,
    /// Whether a receive stream is currently attached.
    pub attached: bool,
    /// Receive streams that have been closed so far.
    pub closed_streams: u64,
}

#[derive(Debug)]
struct Envelope {
    message: StoredMessage,
    attempts: u32,
}

#[derive(Debug)]
struct InFlight {
    envelope: Envelope,
    sent_at: Instant,
}

#[derive(Debug)]
struct Receiver {
    stream_id: u64,
    sender: DeliverySender,
}

#[derive(Debug)]
pub struct SubscriptionQueue {
    pub name: String,
    pub topic: String,
    backlog: VecDeque<Envelope>,
    in_flight: HashMap<String, InFlight>,
    receiver: Option<Receiver>,
    stats: SubscriptionStats,
}

impl SubscriptionQueue {
    pub fn new(name: &str, topic: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            backlog: VecDeque::new(),
            in_flight: HashMap::new(),
            receiver: None,
            stats: SubscriptionStats::default(),
        }
    }

    pub fn enqueue(&mut self, message: StoredMessage) {
        self.backlog.push_back(Envelope {
            message,
            attempts: 0,
        });
    }

    /// Attaches a receive stream, replacing (and thereby ending) any previous one.
    pub(crate) fn attach(&mut self, stream_id: u64, sender: DeliverySender) {
        self.receiver = Some(Receiver { stream_id, sender });
    }

    /// Records that a receive stream went away.
    pub fn detach(&mut self, stream_id: u64) {
        if self
            .receiver
            .as_ref()
            .is_some_and(|r| r.stream_id == stream_id)
        {
            self.receiver = None;
        }
        self.stats.closed_streams += 1;
    }

    /// Ends the attached stream with `error`.
    pub fn disconnect(&mut self, error: TransportError) {
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.sender.send(Err(error));
        }
    }

    /// Pushes the backlog to the attached receiver, if any.
    pub fn dispatch(&mut self, replier: &Arc<dyn AckReplier>) -> usize {
        let Some(receiver) = &self.receiver else {
            return 0;
        };

        let mut sent = 0;
        let mut receiver_gone = false;
        while let Some(mut envelope) = self.backlog.pop_front() {
            envelope.attempts += 1;
            let ack_id = Uuid::new_v4().to_string();
            let message = &envelope.message;
            let delivery = RawDelivery::new(
                ack_id.clone(),
                message.message_id.clone(),
                message.data.clone(),
                message.attributes.clone(),
                message.publish_time,
                envelope.attempts,
                replier.clone(),
            );

            if receiver.sender.send(Ok(delivery)).is_err() {
                envelope.attempts -= 1;
                self.backlog.push_front(envelope);
                receiver_gone = true;
                break;
            }

            self.in_flight.insert(
                ack_id,
                InFlight {
                    envelope,
                    sent_at: Instant::now(),
                },
            );
            self.stats.delivered += 1;
            sent += 1;
        }

        if receiver_gone {
            self.receiver = None;
        }
        sent
    }

    /// Removes an in-flight delivery. Returns `false` for unknown or expired ids.
    pub fn ack(&mut self, ack_id: &str) -> bool {
        if self.in_flight.remove(ack_id).is_some() {
            self.stats.acked += 1;
            true
        } else {
            false
        }
    }

    /// Requeues deliveries older than `deadline`. Returns the ids of messages
    /// dropped because they reached `max_attempts`.
    pub fn expire(&mut self, now: Instant, deadline: Duration, max_attempts: u32) -> Vec<String> {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| now.duration_since(flight.sent_at) >= deadline)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();

        let mut dropped = Vec::new();
        for ack_id in expired {
            let Some(flight) = self.in_flight.remove(&ack_id) else {
                continue;
            };
            if flight.envelope.attempts >= max_attempts {
                self.stats.dropped += 1;
                dropped.push(flight.envelope.message.message_id);
            } else {
                self.stats.redelivered += 1;
                self.backlog.push_back(flight.envelope);
            }
        }
        dropped
    }

    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            backlog: self.backlog.len(),
            outstanding: self.in_flight.len(),
            attached: self.receiver.is_some(),
            ..self.stats.clone()
        }
    }
}

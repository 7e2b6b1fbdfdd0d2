//! Messages crossing the transport boundary.
//!
//! `OutboundMessage` is what the publisher submits. `RawDelivery` is what a
//! receive stream yields: undecoded bytes plus the means to acknowledge them.
//! A delivery that is dropped without `ack` stays outstanding on the
//! transport and becomes eligible for redelivery.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Message attributes. Ordering is irrelevant.
pub type Attributes = HashMap<String, String>;

/// A message ready for the wire.
///
/// Transports require a non-empty `data` or at least one attribute; this
/// layer does not enforce it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub data: Vec<u8>,
    pub attributes: Attributes,
}

impl OutboundMessage {
    pub fn new(data: Vec<u8>, attributes: Attributes) -> Self {
        Self { data, attributes }
    }

    /// True when there is neither data nor any attribute.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.attributes.is_empty()
    }
}

/// Acknowledges deliveries on behalf of a transport.
pub trait AckReplier: Send + Sync {
    fn ack(&self, ack_id: &str);
}

/// A delivery as received from the transport.
pub struct RawDelivery {
    pub ack_id: String,
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: Attributes,
    pub publish_time: DateTime<Utc>,
    pub delivery_attempt: u32,
    replier: Arc<dyn AckReplier>,
}

impl RawDelivery {
    pub fn new(
        ack_id: String,
        message_id: String,
        data: Vec<u8>,
        attributes: Attributes,
        publish_time: DateTime<Utc>,
        delivery_attempt: u32,
        replier: Arc<dyn AckReplier>,
    ) -> Self {
        Self {
            ack_id,
            message_id,
            data,
            attributes,
            publish_time,
            delivery_attempt,
            replier,
        }
    }

    /// Confirms processing. Consumes the delivery so it can be acked once.
    pub fn ack(self) {
        self.replier.ack(&self.ack_id);
    }
}

impl fmt::Debug for RawDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDelivery")
            .field("ack_id", &self.ack_id)
            .field("message_id", &self.message_id)
            .field("data_len", &self.data.len())
            .field("attributes", &self.attributes)
            .field("publish_time", &self.publish_time)
            .field("delivery_attempt", &self.delivery_attempt)
            .finish()
    }
}

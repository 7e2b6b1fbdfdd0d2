use chrono::{DateTime, Utc};

use crate::codec::{self, DecodedPayload};
use crate::transport::{Attributes, RawDelivery};

/// A delivery as seen by a message handler.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    pub message_id: String,
    /// Best-effort decoded payload: JSON if possible, else text, else bytes.
    pub data: DecodedPayload,
    pub attributes: Attributes,
    pub publish_time: DateTime<Utc>,
    /// 1 for the first delivery, incremented on every redelivery.
    pub delivery_attempt: u32,
}

impl DeliveredMessage {
    pub fn from_raw(raw: &RawDelivery) -> Self {
        Self {
            message_id: raw.message_id.clone(),
            data: codec::decode(&raw.data),
            attributes: raw.attributes.clone(),
            publish_time: raw.publish_time,
            delivery_attempt: raw.delivery_attempt,
        }
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::transport::{Attributes, OutboundMessage};

/// A message committed to a topic.
///
/// The broker assigns `message_id` and `publish_time` when it accepts the
/// publish; every subscription attached to the topic receives a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub topic: String,
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: Attributes,
    pub publish_time: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(topic: &str, message: OutboundMessage) -> Self {
        Self {
            topic: topic.to_string(),
            message_id: Uuid::new_v4().to_string(),
            data: message.data,
            attributes: message.attributes,
            publish_time: Utc::now(),
        }
    }
}

//! Publish completion pipeline
//!
//! `publish` encodes the payload locally (failing fast on unsupported kinds),
//! submits it to the transport and then either waits for the outcome or
//! hands it to a callback:
//! - without a callback, the message id is returned and transport errors are
//!   propagated to the caller
//! - with a callback, the call returns immediately and the callback receives
//!   `Some(message_id)` on success, `None` on failure or cancellation. The
//!   cause of a failure is only logged; await the returned handle to get it.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::client::topic_path;
use crate::codec::{self, Payload};
use crate::transport::{Attributes, Completion, CompletionHandle, OutboundMessage, Transport};
use crate::utils::error::Result;

/// Completion callback for asynchronous publishes. Runs on a runtime task.
pub type OnPublished = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// Result of a publish call.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// Set for waited publishes; `None` when a callback was supplied.
    pub message_id: Option<String>,
    pub handle: CompletionHandle,
}

/// Publishes messages and administers topics.
#[derive(Clone)]
pub struct PublisherClient {
    project: String,
    transport: Arc<dyn Transport>,
}

impl PublisherClient {
    pub fn new(project: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            project: project.into(),
            transport,
        }
    }

    pub fn topic_path(&self, topic: &str) -> String {
        topic_path(&self.project, topic)
    }

    /// Creates the topic. An existing topic is not an error.
    pub async fn create_topic(&self, topic: &str) -> Result<String> {
        let path = self.topic_path(topic);
        match self.transport.create_topic(&path).await {
            Ok(name) => Ok(name),
            Err(err) if err.is_already_exists() => {
                debug!(topic = %path, "topic already exists");
                Ok(path)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Looks the topic up. Every transport error is propagated.
    pub async fn get_topic(&self, topic: &str) -> Result<String> {
        let path = self.topic_path(topic);
        Ok(self.transport.get_topic(&path).await?)
    }

    /// Publishes `payload` to `topic`.
    ///
    /// Encoding errors are returned before the transport is called, whether
    /// or not `on_complete` is set.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Payload>,
        attributes: Attributes,
        on_complete: Option<OnPublished>,
    ) -> Result<PublishOutcome> {
        let path = self.topic_path(topic);
        let payload = payload.into();
        debug!(topic = %path, kind = payload.kind(), "publish message");

        let data = codec::encode(payload).inspect_err(|err| {
            error!(topic = %path, error = %err, "payload rejected");
        })?;
        let handle = self
            .transport
            .publish(&path, OutboundMessage::new(data, attributes));

        let Some(callback) = on_complete else {
            let message_id = handle.result().await.inspect_err(|err| {
                error!(topic = %path, error = %err, "publish failed");
            })?;
            info!(topic = %path, %message_id, "data has been published");
            return Ok(PublishOutcome {
                message_id: Some(message_id),
                handle,
            });
        };

        handle.add_done_callback(move |completion| on_published(&path, completion, callback));
        Ok(PublishOutcome {
            message_id: None,
            handle,
        })
    }
}

fn on_published(topic: &str, completion: Completion, callback: OnPublished) {
    let message_id = match completion {
        Completion::Cancelled => {
            warn!(topic, "publish cancelled");
            None
        }
        Completion::Failed(err) => {
            error!(topic, error = %err, "publish failed");
            None
        }
        Completion::Published(message_id) => {
            info!(topic, %message_id, "data has been published");
            Some(message_id)
        }
    };
    callback(message_id);
}

impl std::fmt::Debug for PublisherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherClient")
            .field("project", &self.project)
            .finish()
    }
}


use std::sync::Arc;

use tracing::{debug, info};

use crate::client::{subscription_path, topic_path};
use crate::config::SubscriberSettings;
use crate::subscription::SubscriptionChannel;
use crate::transport::Transport;
use crate::utils::error::Result;

/// Creates subscriptions and hands out channels bound to them.
#[derive(Clone)]
pub struct SubscriberClient {
    project: String,
    transport: Arc<dyn Transport>,
    settings: SubscriberSettings,
}

impl SubscriberClient {
    pub fn new(
        project: impl Into<String>,
        transport: Arc<dyn Transport>,
        settings: SubscriberSettings,
    ) -> Self {
        Self {
            project: project.into(),
            transport,
            settings,
        }
    }

    pub fn subscription_path(&self, subscription: &str) -> String {
        subscription_path(&self.project, subscription)
    }

    /// Creates `subscription` on `topic` and returns an unopened channel for
    /// it. An existing subscription is not an error; every other transport
    /// error is.
    pub async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<SubscriptionChannel> {
        let topic = topic_path(&self.project, topic);
        let path = self.subscription_path(subscription);

        match self.transport.create_subscription(&path, &topic).await {
            Ok(_) => info!(subscription = %path, %topic, "subscription ready"),
            Err(err) if err.is_already_exists() => {
                debug!(subscription = %path, "subscription already exists");
            }
            Err(err) => return Err(err.into()),
        }

        Ok(self.channel(subscription))
    }

    /// A channel for an existing subscription.
    pub fn channel(&self, subscription: &str) -> SubscriptionChannel {
        SubscriptionChannel::new(
            self.transport.clone(),
            self.subscription_path(subscription),
            self.settings.max_outstanding,
        )
    }
}

impl std::fmt::Debug for SubscriberClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberClient")
            .field("project", &self.project)
            .field("settings", &self.settings)
            .finish()
    }
}

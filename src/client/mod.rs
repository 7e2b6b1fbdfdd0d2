//! The `client` module is the caller-facing entry point.
//!
//! - [`PublisherClient`] encodes payloads, submits them and resolves the
//!   outcome either by waiting or through a completion callback.
//! - [`SubscriberClient`] creates subscriptions and hands out
//!   [`SubscriptionChannel`](crate::subscription::SubscriptionChannel)s.
//!
//! Both take short resource names and qualify them with the project.

pub mod publisher;
pub mod subscriber;

pub use publisher::{OnPublished, PublishOutcome, PublisherClient};
pub use subscriber::SubscriberClient;

/// `projects/{project}/topics/{topic}`
pub fn topic_path(project: &str, topic: &str) -> String {
    format!("projects/{project}/topics/{topic}")
}

/// `projects/{project}/subscriptions/{subscription}`
pub fn subscription_path(project: &str, subscription: &str) -> String {
    format!("projects/{project}/subscriptions/{subscription}")
}

#[cfg(test)]
mod tests;

use super::{OnPublished, PublisherClient, SubscriberClient, subscription_path, topic_path};
use crate::broker::Broker;
use crate::config::{BrokerSettings, SubscriberSettings};
use crate::transport::{Completion, TransportError};
use crate::utils::error::PubSubError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const PROJECT: &str = "test";

fn clients(broker: &Broker) -> (PublisherClient, SubscriberClient) {
    let transport = Arc::new(broker.clone());
    (
        PublisherClient::new(PROJECT, transport.clone()),
        SubscriberClient::new(PROJECT, transport, SubscriberSettings::default()),
    )
}

fn callback() -> (OnPublished, mpsc::UnboundedReceiver<Option<String>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let on_complete: OnPublished = Box::new(move |message_id| {
        let _ = tx.send(message_id);
    });
    (on_complete, rx)
}

async fn callback_value(rx: &mut mpsc::UnboundedReceiver<Option<String>>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("callback not invoked in time")
        .expect("callback dropped without being invoked")
}

#[test]
fn test_resource_paths() {
    assert_eq!(topic_path("p", "t"), "projects/p/topics/t");
    assert_eq!(subscription_path("p", "s"), "projects/p/subscriptions/s");
}

#[tokio::test]
async fn test_create_topic_swallows_already_exists() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);

    let first = publisher.create_topic("test-topic").await.unwrap();
    let second = publisher.create_topic("test-topic").await.unwrap();
    assert_eq!(first, "projects/test/topics/test-topic");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_get_topic_propagates_errors() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);

    assert!(matches!(
        publisher.get_topic("missing").await,
        Err(PubSubError::Transport(TransportError::NotFound(_)))
    ));

    broker.set_available(false);
    assert!(matches!(
        publisher.create_topic("test-topic").await,
        Err(PubSubError::Transport(TransportError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn test_waited_publish_returns_message_id() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);
    publisher.create_topic("test-topic").await.unwrap();

    let outcome = publisher
        .publish("test-topic", "string data", HashMap::new(), None)
        .await
        .unwrap();
    let message_id = outcome.message_id.unwrap();
    assert!(!message_id.is_empty());
    assert_eq!(outcome.handle.peek(), Some(Completion::Published(message_id)));
    assert_eq!(broker.published_count(), 1);
}

#[tokio::test]
async fn test_waited_publish_propagates_transport_error() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);

    let result = publisher
        .publish("missing", b"bytes data", HashMap::new(), None)
        .await;
    assert!(matches!(
        result,
        Err(PubSubError::Transport(TransportError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_callback_receives_message_id_once() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);
    publisher.create_topic("test-topic").await.unwrap();

    let (on_complete, mut rx) = callback();
    let outcome = publisher
        .publish("test-topic", b"bytes data", HashMap::new(), Some(on_complete))
        .await
        .unwrap();
    assert!(outcome.message_id.is_none());

    let message_id = outcome.handle.result().await.unwrap();
    assert_eq!(callback_value(&mut rx).await, Some(message_id));
    // The sender is consumed with the callback, so the channel closes.
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_unsupported_payload_never_reaches_transport() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);
    publisher.create_topic("test-topic").await.unwrap();

    let (on_complete, mut rx) = callback();
    let result = publisher
        .publish("test-topic", json!([1, 2, 3]), HashMap::new(), Some(on_complete))
        .await;
    assert!(matches!(result, Err(PubSubError::UnsupportedPayloadType(_))));
    assert_eq!(rx.recv().await, None);

    let result = publisher
        .publish("test-topic", json!(42), HashMap::new(), None)
        .await;
    assert!(matches!(result, Err(PubSubError::UnsupportedPayloadType(_))));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(broker.published_count(), 0);
}

#[tokio::test]
async fn test_failed_async_publish_reports_none() {
    let broker = Broker::default();
    let (publisher, _) = clients(&broker);

    let (on_complete, mut rx) = callback();
    let outcome = publisher
        .publish("missing", "lost", HashMap::new(), Some(on_complete))
        .await
        .unwrap();

    assert_eq!(callback_value(&mut rx).await, None);
    assert!(matches!(
        outcome.handle.peek(),
        Some(Completion::Failed(TransportError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_cancelled_async_publish_reports_none() {
    let broker = Broker::new(BrokerSettings {
        publish_latency_ms: 50,
        ..BrokerSettings::default()
    });
    let (publisher, _) = clients(&broker);
    publisher.create_topic("test-topic").await.unwrap();

    let (on_complete, mut rx) = callback();
    let outcome = publisher
        .publish("test-topic", "never sent", HashMap::new(), Some(on_complete))
        .await
        .unwrap();
    assert!(outcome.handle.cancel());

    assert_eq!(callback_value(&mut rx).await, None);
    assert!(outcome.handle.is_cancelled());
    assert!(matches!(
        outcome.handle.result().await,
        Err(PubSubError::Cancelled)
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.published_count(), 0);
}

#[tokio::test]
async fn test_create_subscription_swallows_already_exists() {
    let broker = Broker::default();
    let (publisher, subscriber) = clients(&broker);
    publisher.create_topic("test-topic").await.unwrap();

    let channel = subscriber
        .create_subscription("test-topic", "test-sub")
        .await
        .unwrap();
    assert_eq!(channel.subscription(), "projects/test/subscriptions/test-sub");

    let again = subscriber
        .create_subscription("test-topic", "test-sub")
        .await
        .unwrap();
    assert_eq!(again.subscription(), channel.subscription());
    assert!(
        broker
            .subscription_stats("projects/test/subscriptions/test-sub")
            .is_some()
    );
}

#[tokio::test]
async fn test_create_subscription_on_missing_topic_fails() {
    let broker = Broker::default();
    let (_, subscriber) = clients(&broker);

    assert!(matches!(
        subscriber.create_subscription("missing", "test-sub").await,
        Err(PubSubError::Transport(TransportError::NotFound(_)))
    ));
}

use super::{Completion, CompletionHandle, OutboundMessage, TransportError};
use crate::utils::error::PubSubError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

#[test]
fn test_first_resolution_wins() {
    let handle = CompletionHandle::new();
    assert!(!handle.is_done());

    assert!(handle.resolve(Completion::Published("m1".to_string())));
    assert!(!handle.resolve(Completion::Failed(TransportError::Closed)));
    assert!(!handle.cancel());

    assert!(handle.is_done());
    assert!(!handle.is_cancelled());
    assert_eq!(handle.peek(), Some(Completion::Published("m1".to_string())));
}

#[test]
fn test_cancel_before_resolution() {
    let handle = CompletionHandle::new();
    assert!(handle.cancel());
    assert!(handle.is_cancelled());
    assert!(!handle.resolve(Completion::Published("late".to_string())));
}

#[test]
fn test_outbound_message_emptiness() {
    assert!(OutboundMessage::default().is_empty());
    assert!(!OutboundMessage::new(b"x".to_vec(), HashMap::new()).is_empty());

    let mut attributes = HashMap::new();
    attributes.insert("k".to_string(), "v".to_string());
    assert!(!OutboundMessage::new(Vec::new(), attributes).is_empty());
}

#[tokio::test]
async fn test_wait_observes_resolution_from_another_task() {
    let handle = CompletionHandle::new();
    let resolver = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        resolver.resolve(Completion::Published("m2".to_string()));
    });

    assert_eq!(handle.result().await.unwrap(), "m2");
}

#[tokio::test]
async fn test_result_maps_failure_and_cancellation() {
    let failed = CompletionHandle::resolved(Completion::Failed(TransportError::Unavailable(
        "down".to_string(),
    )));
    assert!(matches!(
        failed.result().await,
        Err(PubSubError::Transport(TransportError::Unavailable(_)))
    ));

    let cancelled = CompletionHandle::resolved(Completion::Cancelled);
    assert!(matches!(cancelled.result().await, Err(PubSubError::Cancelled)));
}

#[tokio::test]
async fn test_done_callback_runs_once() {
    let handle = CompletionHandle::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();

    let counter = calls.clone();
    let task = handle.add_done_callback(move |completion| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(completion);
    });

    handle.resolve(Completion::Published("m3".to_string()));
    handle.resolve(Completion::Published("m4".to_string()));

    assert_eq!(rx.await.unwrap().message_id(), Some("m3"));
    task.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_already_exists_classification() {
    assert!(TransportError::AlreadyExists("t".to_string()).is_already_exists());
    assert!(!TransportError::NotFound("t".to_string()).is_already_exists());
}

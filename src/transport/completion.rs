//! One-shot publish completion
//!
//! A `CompletionHandle` is shared between the transport, which resolves it,
//! and the caller, which waits on it or registers a callback. Resolution is
//! guarded by an atomic flag so the first of "published", "failed" or
//! "cancelled" wins and every later attempt is ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::transport::TransportError;
use crate::utils::error::{PubSubError, Result};

/// Terminal state of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The transport assigned this message id.
    Published(String),
    /// The transport failed the publish.
    Failed(TransportError),
    /// The publish was cancelled before the transport committed it.
    Cancelled,
}

impl Completion {
    /// The message id, if the publish succeeded.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Completion::Published(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    resolved: AtomicBool,
    state: watch::Sender<Option<Completion>>,
}

/// Handle to the eventual outcome of a publish. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    inner: Arc<Inner>,
}

impl Default for CompletionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionHandle {
    /// Creates an unresolved handle.
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                resolved: AtomicBool::new(false),
                state,
            }),
        }
    }

    /// Creates a handle that is already resolved.
    pub fn resolved(completion: Completion) -> Self {
        let handle = Self::new();
        handle.resolve(completion);
        handle
    }

    /// Resolves the handle. Returns `false` if it was already resolved, in
    /// which case `completion` is discarded.
    pub fn resolve(&self, completion: Completion) -> bool {
        if self.inner.resolved.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.state.send_replace(Some(completion));
        true
    }

    /// Cancels the publish unless the transport already resolved it.
    pub fn cancel(&self) -> bool {
        self.resolve(Completion::Cancelled)
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.state.borrow(), Some(Completion::Cancelled))
    }

    /// The terminal state, if reached.
    pub fn peek(&self) -> Option<Completion> {
        self.inner.state.borrow().clone()
    }

    /// Waits until the handle is resolved.
    pub async fn wait(&self) -> Completion {
        let mut rx = self.inner.state.subscribe();
        let completion = match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).clone().unwrap_or(Completion::Cancelled),
            // The sender lives in `inner`, which we hold.
            Err(_) => Completion::Cancelled,
        };
        completion
    }

    /// Waits for the assigned message id, turning failures into errors.
    pub async fn result(&self) -> Result<String> {
        match self.wait().await {
            Completion::Published(message_id) => Ok(message_id),
            Completion::Failed(err) => Err(PubSubError::Transport(err)),
            Completion::Cancelled => Err(PubSubError::Cancelled),
        }
    }

    /// Runs `callback` on a runtime task once the handle resolves.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_done_callback<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            let completion = handle.wait().await;
            callback(completion);
        })
    }
}

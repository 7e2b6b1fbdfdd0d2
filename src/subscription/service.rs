//! Subscription service
//!
//! A [`SubscriptionService`] owns exactly one [`SubscriptionChannel`] and is
//! single-use. Its lifecycle only moves forward:
//!
//! ```text
//! Idle --run--> Running --stop--> Draining --drained--> Stopped
//!   \------------------shutdown before run------------------^
//! ```
//!
//! The stop condition is a [`CancellationToken`]. `shutdown()` cancels it,
//! and so does a termination signal when signal handling is enabled. Signal
//! handling is opt-in and should only be enabled for the service that runs on
//! the process's main task; everything else calls `shutdown()`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::subscription::channel::{ChannelStats, SubscriptionChannel};
use crate::subscription::handler::MessageHandler;
use crate::utils::error::{PubSubError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriptionState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Idle => "idle",
            SubscriptionState::Running => "running",
            SubscriptionState::Draining => "draining",
            SubscriptionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SubscriptionService {
    subscription: String,
    channel: Mutex<Option<SubscriptionChannel>>,
    state: watch::Sender<SubscriptionState>,
    stop: CancellationToken,
    handle_signals: bool,
}

impl SubscriptionService {
    pub fn new(channel: SubscriptionChannel) -> Self {
        Self::with_cancellation(channel, CancellationToken::new())
    }

    /// Uses `stop` as the stop condition, so a parent token can shut the
    /// service down.
    pub fn with_cancellation(channel: SubscriptionChannel, stop: CancellationToken) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Idle);
        Self {
            subscription: channel.subscription().to_string(),
            channel: Mutex::new(Some(channel)),
            state,
            stop,
            handle_signals: false,
        }
    }

    /// Let SIGINT/SIGTERM trigger shutdown while running. Off by default.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Opens the channel and blocks until the service has stopped and the
    /// channel has drained.
    ///
    /// Returns the channel's counters, or the error that ended the channel
    /// early. Fails with `InvalidState` unless the service is `Idle`.
    pub async fn run(&self, handler: Option<Arc<dyn MessageHandler>>) -> Result<ChannelStats> {
        self.transition(SubscriptionState::Idle, SubscriptionState::Running)?;
        // Declared before `handle` so it drops last, including when this
        // future is dropped mid-run.
        let stopping = StopOnDrop(self);

        let channel = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(channel) = channel else {
            return Err(PubSubError::InvalidState {
                expected: "unopened channel",
                found: "no channel".to_string(),
            });
        };

        let mut handle = match channel.open(handler).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(subscription = %self.subscription, error = %err, "failed to open subscription channel");
                return Err(err);
            }
        };
        info!(subscription = %self.subscription, "listening for messages");

        let ended = tokio::select! {
            _ = self.stop.cancelled() => None,
            signal = termination_signal(), if self.handle_signals => {
                info!(subscription = %self.subscription, signal, "termination signal received");
                None
            }
            result = handle.wait() => Some(result),
        };

        self.advance(SubscriptionState::Draining);
        info!(subscription = %self.subscription, "draining subscription");
        handle.close();

        let result = match ended {
            Some(result) => {
                if let Err(err) = &result {
                    error!(subscription = %self.subscription, error = %err, "subscription channel failed");
                }
                result
            }
            None => handle.wait().await,
        };

        drop(handle);
        drop(stopping);
        info!(subscription = %self.subscription, "subscription stopped");
        result
    }

    /// Stops the service and waits until `run` has drained the channel.
    ///
    /// A service that never ran goes straight to `Stopped`. Calling this on a
    /// service that is already draining or stopped does nothing.
    pub async fn shutdown(&self) {
        if self
            .transition(SubscriptionState::Idle, SubscriptionState::Stopped)
            .is_ok()
        {
            info!(subscription = %self.subscription, "subscription stopped before it ran");
            self.stop.cancel();
            return;
        }

        match self.state() {
            SubscriptionState::Running => {
                debug!(subscription = %self.subscription, "shutdown requested");
                self.stop.cancel();
                self.stopped().await;
            }
            state => debug!(subscription = %self.subscription, %state, "shutdown ignored"),
        }
    }

    /// Resolves once the service reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so this cannot fail while we are borrowed.
        let _ = rx
            .wait_for(|state| *state == SubscriptionState::Stopped)
            .await;
    }

    fn transition(&self, from: SubscriptionState, to: SubscriptionState) -> Result<()> {
        let mut found = from;
        let moved = self.state.send_if_modified(|state| {
            found = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });

        if moved {
            debug!(subscription = %self.subscription, %from, %to, "state changed");
            Ok(())
        } else {
            Err(PubSubError::InvalidState {
                expected: from.as_str(),
                found: found.to_string(),
            })
        }
    }

    fn advance(&self, to: SubscriptionState) {
        self.state.send_if_modified(|state| {
            if *state < to {
                *state = to;
                true
            } else {
                false
            }
        });
    }

    fn finish(&self) {
        self.stop.cancel();
        self.advance(SubscriptionState::Stopped);
    }
}

/// Moves the service to `Stopped` when `run` returns or is dropped.
struct StopOnDrop<'a>(&'a SubscriptionService);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("subscription", &self.subscription)
            .field("state", &self.state())
            .field("handle_signals", &self.handle_signals)
            .finish()
    }
}

/// Resolves with the name of the first termination signal received.
///
/// If a handler cannot be installed the corresponding branch never resolves.
pub async fn termination_signal() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}

//! The `subscription` module manages message consumption.
//!
//! - [`SubscriptionChannel`] turns a transport receive stream into handler
//!   invocations and applies the acknowledgment policy.
//! - [`SubscriptionService`] owns one channel for its whole life and drives
//!   the `Idle -> Running -> Draining -> Stopped` lifecycle, including
//!   signal-triggered shutdown.

pub mod channel;
pub mod handler;
pub mod message;
pub mod service;

pub use channel::{ChannelHandle, ChannelStats, SubscriptionChannel};
pub use handler::{HandlerError, HandlerResult, MessageHandler};
pub use message::DeliveredMessage;
pub use service::{SubscriptionService, SubscriptionState, termination_signal};

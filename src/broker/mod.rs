//! The `broker` module is an in-process implementation of [`Transport`].
//!
//! It keeps topics, subscriptions and per-subscription queues in memory,
//! tracks acknowledgments and redelivers messages whose ack deadline expired.
//! Tests use it as the transport double; the demo binary uses it as its
//! backend.
//!
//! [`Transport`]: crate::transport::Transport

pub mod engine;
pub mod message;
pub mod subscription;
pub mod topic;

pub use engine::Broker;
pub use subscription::SubscriptionStats;

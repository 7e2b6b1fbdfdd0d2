//! # pubsub-client
//!
//! `pubsub_client` is an async client layer for a cloud publish/subscribe
//! service. It wraps a [`transport::Transport`] with payload encoding,
//! publish completion handling and a managed subscription lifecycle.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `codec`: Encodes payloads to bytes and decodes deliveries best-effort.
//! - `transport`: The backend contract, completion handles and raw deliveries.
//! - `broker`: An in-process transport with ack tracking and redelivery.
//! - `client`: Publisher and subscriber clients with topic/subscription admin.
//! - `subscription`: Subscription channels, handlers and the lifecycle service.
//! - `flow`: A bounded producer/worker pipeline with backpressure.
//! - `config`: Handles loading and layering settings.
//! - `utils`: Shared utilities, such as error handling and logging.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod flow;
pub mod subscription;
pub mod transport;
pub mod utils;

pub use utils::error::{PubSubError, Result};

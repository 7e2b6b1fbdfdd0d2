//! The `flow` module demonstrates bounded backpressure between a producer
//! and a pool of workers.

pub mod pipeline;

pub use pipeline::{FlowControlledPipeline, FlowReport};

#[cfg(test)]
mod tests;

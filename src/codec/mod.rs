//! The `codec` module converts application payloads into transport bytes and
//! turns delivered bytes back into the most specific representation available.
//!
//! Encoding is strict: only raw bytes, UTF-8 text and JSON objects are
//! accepted. Decoding is best-effort and never fails.

pub mod payload;

pub use payload::{DecodedPayload, Payload, decode, encode};

//! Wire protocol shared by the pushmon agent and server.
//!
//! The agent serializes [`types::Metric`] batches with this codec and the
//! server decodes them with the same definitions, so both sides agree on the
//! JSON shape byte for byte. [`signing`] holds the HMAC helpers used on both
//! ends of the integrity check.

pub mod signing;
pub mod types;

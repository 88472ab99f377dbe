//! Codec module - JSON for events and responses.
//!
//! - [`JsonCodec`] - decode events, encode responses
//! - [`JsonOptions`] - HTML escaping and indentation applied to responses
//!
//! # Design
//!
//! The codec is a marker struct with static methods rather than a trait
//! object. The formatter is internal; callers only see [`JsonOptions`].

mod formatter;
mod json;

pub use json::{JsonCodec, JsonOptions};

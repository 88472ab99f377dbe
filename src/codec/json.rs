//! JSON codec for events and responses.
//!
//! Decoding reads the first JSON value of the payload and ignores whatever
//! follows it. Encoding always terminates the value with `\n`, the way a
//! streaming encoder does; callers decide whether to keep it.
//!
//! # Example
//!
//! ```
//! use funcwire::codec::{JsonCodec, JsonOptions};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! let decoded: Greeting = JsonCodec::decode(br#"{"name":"Bob"}"#).unwrap();
//! assert_eq!(decoded, Greeting { name: "Bob".to_string() });
//!
//! let encoded = JsonCodec::encode(&decoded, &JsonOptions::default()).unwrap();
//! assert_eq!(encoded, b"{\"name\":\"Bob\"}\n");
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::formatter::ResponseFormatter;
use crate::error::InvokeError;

/// Serialization options applied to every response.
///
/// Set once when the server is built and read on every invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Escape `<`, `>` and `&` inside JSON strings.
    pub escape_html: bool,
    /// Written at the start of every indented line.
    pub indent_prefix: String,
    /// Written once per nesting level on indented lines.
    pub indent_value: String,
}

impl JsonOptions {
    /// Whether pretty printing was requested.
    #[inline]
    pub fn is_indented(&self) -> bool {
        !self.indent_prefix.is_empty() || !self.indent_value.is_empty()
    }
}

/// JSON codec with static methods, mirroring how payloads cross the wire.
pub struct JsonCodec;

impl JsonCodec {
    /// Decode the first JSON value in `payload`.
    ///
    /// # Errors
    ///
    /// [`InvokeError::EmptyPayload`] when the payload holds only whitespace,
    /// [`InvokeError::Decode`] when the value does not match `T`.
    pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, InvokeError> {
        let mut values = serde_json::Deserializer::from_slice(payload).into_iter::<T>();
        match values.next() {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) if e.is_eof() && is_blank(payload) => Err(InvokeError::EmptyPayload),
            Some(Err(e)) => Err(InvokeError::Decode(e)),
            None => Err(InvokeError::EmptyPayload),
        }
    }

    /// Encode `value` followed by a newline.
    ///
    /// Map entries keep their serialization order. Keys are not sorted, so a
    /// `BTreeMap` gives stable output where a `HashMap` does not.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the value cannot be represented as JSON
    /// (for example a map with non-string keys).
    pub fn encode<T: Serialize + ?Sized>(value: &T, options: &JsonOptions) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(128);
        let mut ser = serde_json::Serializer::with_formatter(&mut out, ResponseFormatter::new(options));
        value.serialize(&mut ser)?;
        out.push(b'\n');
        Ok(out)
    }
}

fn is_blank(payload: &[u8]) -> bool {
    payload.iter().all(|b| b.is_ascii_whitespace())
}

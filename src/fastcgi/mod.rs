//! FastCGI module - responder side of the FastCGI protocol.
//!
//! - 8-byte record header encoding/decoding
//! - Record buffer for accumulating partial reads
//! - Name-value pairs for `PARAMS` and `GET_VALUES`
//! - Writer task per connection
//! - [`serve_connection`] - request multiplexing on one connection

mod conn;
mod params;
mod record;
mod record_buffer;
mod writer;

pub use conn::serve_connection;
pub use params::{decode_pairs, encode_pairs};
pub use record::{
    flags, padding_for, unknown_type_body, BeginRequestBody, EndRequestBody, Header,
    ProtocolStatus, Record, RecordType, Role, HEADER_SIZE, MAX_CONTENT_LENGTH, NULL_REQUEST_ID,
    VERSION_1,
};
pub use record_buffer::RecordBuffer;
pub use writer::{spawn_writer_task, OutboundRecord, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

//! Record buffer for accumulating partial reads.
//!
//! Implements a state machine for fragmented records:
//! - `WaitingForHeader`: Need at least 8 bytes
//! - `WaitingForBody`: Header parsed, need content plus padding

use bytes::BytesMut;

use super::record::{Header, Record, HEADER_SIZE};
use crate::error::Result;

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForBody { header: Header },
}

/// Buffer for incoming bytes that yields complete records.
pub struct RecordBuffer {
    buffer: BytesMut,
    state: State,
}

impl RecordBuffer {
    /// Create a new record buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete records.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a header carries an unsupported version.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Record>> {
        self.buffer.extend_from_slice(data);

        let mut records = Vec::new();
        while let Some(record) = self.try_extract_one()? {
            records.push(record);
        }
        Ok(records)
    }

    fn try_extract_one(&mut self) -> Result<Option<Record>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    header.validate()?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForBody { header };
                }

                State::WaitingForBody { header } => {
                    if self.buffer.len() < header.body_length() {
                        return Ok(None);
                    }

                    let header = *header;
                    let content = self.buffer.split_to(header.content_length as usize).freeze();
                    let _ = self.buffer.split_to(header.padding_length as usize);
                    self.state = State::WaitingForHeader;

                    return Ok(Some(Record::new(header, content)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}

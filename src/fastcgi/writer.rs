//! Dedicated writer task for outgoing records.
//!
//! Request tasks never touch the socket. They hand complete records to a
//! single writer task per connection through an mpsc channel, so records
//! from concurrent requests never interleave mid-record.
//!
//! ```text
//! Request 1 ─┐
//! Request 2 ─┼─► mpsc::Sender<OutboundRecord> ─► Writer Task ─► Socket
//! Read loop ─┘
//! ```
//!
//! When every handle is dropped the task flushes, shuts the socket down and
//! exits.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::record::{
    unknown_type_body, EndRequestBody, Header, ProtocolStatus, RecordType, HEADER_SIZE,
    MAX_CONTENT_LENGTH,
};
use crate::error::{FuncwireError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum records to batch in a single write.
const MAX_BATCH_SIZE: usize = 64;

const PADDING: [u8; 8] = [0; 8];

/// A record ready to be written.
#[derive(Debug)]
pub struct OutboundRecord {
    header: Header,
    content: Bytes,
}

impl OutboundRecord {
    /// Create a single record.
    ///
    /// Content longer than [`MAX_CONTENT_LENGTH`] is truncated; use
    /// [`OutboundRecord::stream`] for arbitrary lengths.
    pub fn new(record_type: RecordType, request_id: u16, content: Bytes) -> Self {
        let content = if content.len() > MAX_CONTENT_LENGTH {
            content.slice(..MAX_CONTENT_LENGTH)
        } else {
            content
        };
        Self {
            header: Header::new(record_type, request_id, content.len() as u16),
            content,
        }
    }

    /// Split `data` into as many records as needed. Empty data yields no
    /// records; the stream terminator is sent separately.
    pub fn stream(record_type: RecordType, request_id: u16, data: Bytes) -> Vec<Self> {
        let mut records = Vec::with_capacity(data.len() / MAX_CONTENT_LENGTH + 1);
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + MAX_CONTENT_LENGTH).min(data.len());
            records.push(Self::new(record_type, request_id, data.slice(offset..end)));
            offset = end;
        }
        records
    }

    /// `END_REQUEST` with the given statuses.
    pub fn end_request(request_id: u16, app_status: u32, protocol_status: ProtocolStatus) -> Self {
        let body = EndRequestBody {
            app_status,
            protocol_status,
        };
        Self::new(
            RecordType::EndRequest,
            request_id,
            Bytes::copy_from_slice(&body.encode()),
        )
    }

    /// `UNKNOWN_TYPE` answering a record of `record_type`.
    pub fn unknown_type(record_type: RecordType) -> Self {
        Self::new(
            RecordType::UnknownType,
            0,
            Bytes::copy_from_slice(&unknown_type_body(record_type)),
        )
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Total size on the wire, padding included.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.header.body_length()
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.content);
        buf.extend_from_slice(&PADDING[..self.header.padding_length as usize]);
    }
}

/// Handle for sending records to the writer task.
///
/// This is cheaply cloneable and shared by every request on the connection.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundRecord>,
}

impl WriterHandle {
    /// Queue a record.
    pub async fn send(&self, record: OutboundRecord) -> Result<()> {
        self.tx
            .send(record)
            .await
            .map_err(|_| FuncwireError::ConnectionClosed)
    }

    /// Queue records in order.
    pub async fn send_all(&self, records: Vec<OutboundRecord>) -> Result<()> {
        for record in records {
            self.send(record).await?;
        }
        Ok(())
    }
}

/// Spawn the writer task and return a handle for sending records.
///
/// The JoinHandle resolves once every handle is dropped and the socket is
/// shut down, or on the first write error.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundRecord>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(64 * 1024);
    while let Some(first) = rx.recv().await {
        first.encode_into(&mut buf);

        // Collect additional ready records without waiting.
        let mut batched = 1;
        while batched < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(record) => {
                    record.encode_into(&mut buf);
                    batched += 1;
                }
                Err(_) => break,
            }
        }

        writer.write_all(&buf).await?;
        writer.flush().await?;
        tracing::trace!("Wrote {} records ({} bytes)", batched, buf.len());
        buf.clear();
    }

    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastcgi::record_buffer::RecordBuffer;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_record_size_includes_padding() {
        let record = OutboundRecord::new(RecordType::Stdout, 1, Bytes::from_static(b"hello"));
        assert_eq!(record.header().padding_length, 3);
        assert_eq!(record.size(), 16);
    }

    #[test]
    fn test_stream_splits_large_content() {
        let data = Bytes::from(vec![7u8; MAX_CONTENT_LENGTH * 2 + 10]);
        let records = OutboundRecord::stream(RecordType::Stdout, 2, data);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].content().len(), MAX_CONTENT_LENGTH);
        assert_eq!(records[1].content().len(), MAX_CONTENT_LENGTH);
        assert_eq!(records[2].content().len(), 10);
    }

    #[test]
    fn test_stream_of_nothing() {
        assert!(OutboundRecord::stream(RecordType::Stdout, 1, Bytes::new()).is_empty());
    }

    #[test]
    fn test_end_request_record() {
        let record = OutboundRecord::end_request(5, 0, ProtocolStatus::RequestComplete);
        assert_eq!(record.header().record_type, RecordType::EndRequest);
        assert_eq!(record.header().request_id, 5);
        assert_eq!(&record.content()[..], &[0u8; 8]);
    }

    #[tokio::test]
    async fn test_writer_task_writes_and_shuts_down() {
        let (client, mut server) = duplex(1024);
        let (handle, task) = spawn_writer_task(client, 16);

        handle
            .send(OutboundRecord::new(RecordType::Stdout, 1, Bytes::from_static(b"abc")))
            .await
            .unwrap();
        handle
            .send(OutboundRecord::end_request(1, 0, ProtocolStatus::RequestComplete))
            .await
            .unwrap();
        drop(handle);

        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len() % 8, 0);

        let records = RecordBuffer::new().push(&received).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0].content[..], b"abc");
        assert_eq!(records[1].record_type(), RecordType::EndRequest);
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (client, server) = duplex(64);
        drop(server);
        let (handle, task) = spawn_writer_task(client, 1);

        let _ = handle
            .send(OutboundRecord::new(RecordType::Stdout, 1, Bytes::from_static(b"x")))
            .await;
        assert!(task.await.unwrap().is_err());

        let result = handle
            .send(OutboundRecord::new(RecordType::Stdout, 1, Bytes::from_static(b"y")))
            .await;
        assert!(matches!(result, Err(FuncwireError::ConnectionClosed)));
    }
}

//! Per-connection FastCGI responder.
//!
//! The read loop reassembles records and routes them by request id. Once a
//! request's `PARAMS` stream ends it is dispatched on its own task, which
//! reads the body as `STDIN` arrives and writes the response through the
//! connection's writer task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use super::params::{decode_pairs, encode_pairs};
use super::record::{BeginRequestBody, ProtocolStatus, Record, RecordType, Role};
use super::record_buffer::RecordBuffer;
use super::writer::{spawn_writer_task, OutboundRecord, WriterHandle, DEFAULT_CHANNEL_CAPACITY};
use crate::error::{FuncwireError, Result};
use crate::server::{Body, BodySender, Request, Response, Server};

/// Values reported in answer to `GET_VALUES`.
const MANAGEMENT_VALUES: [(&str, &str); 1] = [("FCGI_MPXS_CONNS", "1")];

/// A request between `BEGIN_REQUEST` and the end of its `STDIN` stream.
struct InFlight {
    keep_conn: bool,
    params: BytesMut,
    /// Taken when the request is dispatched.
    body: Option<Body>,
    sender: BodySender,
    aborted: Arc<AtomicBool>,
}

enum Flow {
    Continue,
    Close,
}

struct Connection {
    server: Arc<Server>,
    writer: WriterHandle,
    close: CancellationToken,
    requests: HashMap<u16, InFlight>,
}

/// Serve FastCGI requests on one connection until the host closes it.
///
/// Returns once the connection is closed and every response has been
/// written.
///
/// # Errors
///
/// Malformed records, duplicate request ids and I/O failures end the
/// connection with an error. In-flight requests see a failed body.
pub async fn serve_connection<R, W>(reader: R, writer: W, server: Arc<Server>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (writer, writer_task) = spawn_writer_task(writer, DEFAULT_CHANNEL_CAPACITY);
    let mut conn = Connection {
        server,
        writer,
        close: CancellationToken::new(),
        requests: HashMap::new(),
    };

    let result = conn.read_loop(reader).await;
    conn.fail_all("connection closed");
    drop(conn);

    let written = match writer_task.await {
        Ok(written) => written,
        Err(e) => Err(FuncwireError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))),
    };
    result.and(written)
}

impl Connection {
    async fn read_loop<R: AsyncRead + Unpin>(&mut self, mut reader: R) -> Result<()> {
        let mut record_buffer = RecordBuffer::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = tokio::select! {
                _ = self.close.cancelled() => {
                    tracing::debug!("Closing connection after response");
                    return Ok(());
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => return Ok(()),
                    Ok(n) => n,
                    Err(e) => return Err(FuncwireError::Io(e)),
                },
            };

            for record in record_buffer.push(&buf[..n])? {
                if let Flow::Close = self.handle_record(record).await? {
                    return Ok(());
                }
            }
        }
    }

    async fn handle_record(&mut self, record: Record) -> Result<Flow> {
        let id = record.request_id();

        match record.record_type() {
            RecordType::BeginRequest => self.begin(id, &record.content).await,
            RecordType::GetValues => {
                let pairs = encode_pairs(MANAGEMENT_VALUES);
                let reply = OutboundRecord::new(RecordType::GetValuesResult, 0, pairs);
                self.writer.send(reply).await?;
                Ok(Flow::Continue)
            }
            other if record.header.is_management() => {
                tracing::debug!("Unknown management record type {:?}", other);
                self.writer.send(OutboundRecord::unknown_type(other)).await?;
                Ok(Flow::Continue)
            }
            _ if !self.requests.contains_key(&id) => {
                tracing::trace!("Ignoring {:?} for unknown request {}", record.record_type(), id);
                Ok(Flow::Continue)
            }
            RecordType::Params => {
                self.params(id, record.content);
                Ok(Flow::Continue)
            }
            RecordType::Stdin => {
                self.stdin(id, record.content);
                Ok(Flow::Continue)
            }
            RecordType::AbortRequest => self.abort(id).await,
            RecordType::Data => Ok(Flow::Continue),
            other => {
                self.writer.send(OutboundRecord::unknown_type(other)).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn begin(&mut self, id: u16, content: &[u8]) -> Result<Flow> {
        if self.requests.contains_key(&id) {
            return Err(FuncwireError::Protocol(format!(
                "received ID {} that is already in-flight",
                id
            )));
        }

        let body = BeginRequestBody::decode(content)?;
        if body.role != Role::Responder {
            tracing::warn!("Rejecting request {} with role {:?}", id, body.role);
            let end = OutboundRecord::end_request(id, 0, ProtocolStatus::UnknownRole);
            self.writer.send(end).await?;
            return Ok(Flow::Continue);
        }

        let (sender, receiver) = Body::channel();
        self.requests.insert(
            id,
            InFlight {
                keep_conn: body.keep_conn(),
                params: BytesMut::new(),
                body: Some(receiver),
                sender,
                aborted: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(Flow::Continue)
    }

    fn params(&mut self, id: u16, content: Bytes) {
        let Some(req) = self.requests.get_mut(&id) else { return };
        if !content.is_empty() {
            req.params.extend_from_slice(&content);
            return;
        }
        let Some(body) = req.body.take() else {
            tracing::debug!("Duplicate end of PARAMS for request {}", id);
            return;
        };

        let params = decode_pairs(&req.params);
        req.params.clear();
        tracing::debug!(
            "Dispatching request {}: {} {}",
            id,
            params.get("REQUEST_METHOD").map(String::as_str).unwrap_or("-"),
            params.get("REQUEST_URI").map(String::as_str).unwrap_or("-"),
        );

        let task = RequestTask {
            id,
            keep_conn: req.keep_conn,
            aborted: req.aborted.clone(),
            server: self.server.clone(),
            writer: self.writer.clone(),
            close: self.close.clone(),
        };
        tokio::spawn(task.run(Request::new(params, body)));
    }

    fn stdin(&mut self, id: u16, content: Bytes) {
        if content.is_empty() {
            // The id may be reused once its body is complete.
            if let Some(req) = self.requests.remove(&id) {
                req.sender.finish();
            }
        } else if let Some(req) = self.requests.get(&id) {
            req.sender.push(content);
        }
    }

    async fn abort(&mut self, id: u16) -> Result<Flow> {
        let Some(req) = self.requests.remove(&id) else {
            return Ok(Flow::Continue);
        };
        tracing::debug!("Request {} aborted by host", id);

        req.aborted.store(true, Ordering::Release);
        req.sender.fail("request aborted");

        let end = OutboundRecord::end_request(id, 0, ProtocolStatus::RequestComplete);
        self.writer.send(end).await?;

        Ok(if req.keep_conn {
            Flow::Continue
        } else {
            Flow::Close
        })
    }

    fn fail_all(&mut self, reason: &str) {
        for (_, req) in self.requests.drain() {
            req.sender.fail(reason);
        }
    }
}

/// Everything a dispatched request needs after leaving the read loop.
struct RequestTask {
    id: u16,
    keep_conn: bool,
    aborted: Arc<AtomicBool>,
    server: Arc<Server>,
    writer: WriterHandle,
    close: CancellationToken,
}

impl RequestTask {
    async fn run(self, request: Request) {
        let response = self.server.respond(request).await;

        if self.aborted.load(Ordering::Acquire) {
            tracing::debug!("Dropping response for aborted request {}", self.id);
            return;
        }

        if let Err(e) = write_response(&self.writer, self.id, &response).await {
            tracing::warn!("Failed to write response for request {}: {}", self.id, e);
        }

        if !self.keep_conn {
            self.close.cancel();
        }
    }
}

/// Write CGI headers and body on `STDOUT`, close the stream and end the
/// request.
async fn write_response(writer: &WriterHandle, id: u16, response: &Response) -> Result<()> {
    let status = response.status();
    let mut head = format!("Status: {} {}\r\n", status.code(), status.reason());
    for (name, value) in response.headers() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let body = response.body();
    let mut stdout = BytesMut::with_capacity(head.len() + body.len());
    stdout.extend_from_slice(head.as_bytes());
    stdout.extend_from_slice(body);

    let mut records = OutboundRecord::stream(RecordType::Stdout, id, stdout.freeze());
    records.push(OutboundRecord::new(RecordType::Stdout, id, Bytes::new()));
    records.push(OutboundRecord::end_request(id, 0, ProtocolStatus::RequestComplete));
    writer.send_all(records).await
}

//! Invocation server.
//!
//! The [`Server`] owns the normalized handler, the serialization options and
//! the base [`Context`]. It answers one request at a time per call to
//! [`Server::respond`]; the transport decides how many run concurrently.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use funcwire::server::{Body, Request, Server, Status};
//! use funcwire::{BoxError, RawHandler};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let server = Server::builder()
//!     .indent("", "  ")
//!     .build(RawHandler::function(|n: u32| async move {
//!         Ok::<_, BoxError>(vec![n; 2])
//!     }));
//!
//! let response = server
//!     .respond(Request::new(Default::default(), Body::from_bytes(Bytes::from_static(b"7"))))
//!     .await;
//! assert_eq!(response.status(), Status::Ok);
//! assert_eq!(response.body(), &b"[\n  7,\n  7\n]\n"[..]);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::codec::JsonOptions;
use crate::error::BodyError;
use crate::handler::{normalize, Context, Handler, RawHandler};

/// Body sent when the request body cannot be read.
pub const BODY_READ_ERROR: &str = "can't read body";

/// Body of the 500 response when the handler panics.
pub const HANDLER_PANIC: &str = "handler panicked";

/// Content type of successful responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of error responses.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Builder for configuring and creating a [`Server`].
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    options: JsonOptions,
    base_context: Context,
}

impl ServerBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Escape `<`, `>` and `&` in response strings.
    ///
    /// Default: false
    pub fn escape_html(mut self, on: bool) -> Self {
        self.options.escape_html = on;
        self
    }

    /// Pretty print responses. Each indented line starts with `prefix`
    /// followed by one `value` per nesting level.
    ///
    /// Default: no indentation
    pub fn indent(mut self, prefix: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.indent_prefix = prefix.into();
        self.options.indent_value = value.into();
        self
    }

    /// Replace all serialization options at once.
    pub fn json_options(mut self, options: JsonOptions) -> Self {
        self.options = options;
        self
    }

    /// Context handed to every invocation.
    ///
    /// Default: [`Context::background`]
    pub fn base_context(mut self, ctx: Context) -> Self {
        self.base_context = ctx;
        self
    }

    /// Normalize `handler` and build the server.
    pub fn build(self, handler: impl Into<RawHandler>) -> Server {
        let handler = normalize(handler, &self.options);
        Server {
            handler,
            base_context: self.base_context,
            options: self.options,
        }
    }
}

/// Serves one normalized handler.
pub struct Server {
    handler: Arc<dyn Handler>,
    base_context: Context,
    options: JsonOptions,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Build a server with default options.
    pub fn new(handler: impl Into<RawHandler>) -> Self {
        ServerBuilder::new().build(handler)
    }

    /// The normalized handler.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Serialization options used for responses.
    pub fn options(&self) -> &JsonOptions {
        &self.options
    }

    /// Read the whole body, invoke the handler and build the response.
    ///
    /// The handler runs on its own task, so a panic in user code answers
    /// `500` with [`HANDLER_PANIC`] instead of losing the request.
    pub async fn respond(&self, request: Request) -> Response {
        let Request { params, body } = request;
        let uri = params.get("REQUEST_URI").map(String::as_str).unwrap_or("");

        let payload = match body.collect().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to read request body for {:?}: {}", uri, e);
                return Response::error(Status::BadRequest, BODY_READ_ERROR);
            }
        };

        tracing::debug!("Invoking handler for {:?} with {} byte payload", uri, payload.len());

        let handler = self.handler.clone();
        let ctx = self.base_context.clone();
        let invocation = tokio::spawn(async move { handler.invoke(ctx, payload).await });

        match invocation.await {
            Ok(Ok(body)) => Response::ok(body),
            Ok(Err(e)) => {
                tracing::error!("Handler error for {:?}: {}", uri, e);
                Response::error(Status::InternalServerError, e.to_string())
            }
            Err(e) => {
                tracing::error!("Handler for {:?} did not complete: {}", uri, e);
                Response::error(Status::InternalServerError, HANDLER_PANIC)
            }
        }
    }
}

/// One request as seen by the server.
#[derive(Debug)]
pub struct Request {
    params: HashMap<String, String>,
    body: Body,
}

impl Request {
    pub fn new(params: HashMap<String, String>, body: Body) -> Self {
        Self { params, body }
    }

    /// A CGI parameter sent by the host, such as `REQUEST_METHOD`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[derive(Debug)]
enum BodyChunk {
    Data(Bytes),
    End,
    Error(String),
}

/// Request body, delivered in chunks by the transport.
#[derive(Debug)]
pub struct Body {
    rx: mpsc::UnboundedReceiver<BodyChunk>,
}

impl Body {
    /// Create a connected sender/body pair.
    pub fn channel() -> (BodySender, Body) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BodySender { tx }, Body { rx })
    }

    /// A body that is already complete.
    pub fn from_bytes(data: Bytes) -> Self {
        let (sender, body) = Self::channel();
        sender.push(data);
        sender.finish();
        body
    }

    /// Read the body to its end.
    ///
    /// # Errors
    ///
    /// Fails if the sender reported an error or went away before finishing.
    pub async fn collect(mut self) -> Result<Bytes, BodyError> {
        let mut buf = BytesMut::new();
        loop {
            match self.rx.recv().await {
                Some(BodyChunk::Data(data)) => buf.extend_from_slice(&data),
                Some(BodyChunk::End) => return Ok(buf.freeze()),
                Some(BodyChunk::Error(reason)) => return Err(BodyError::Aborted(reason)),
                None => return Err(BodyError::Truncated),
            }
        }
    }
}

/// Write side of a [`Body`].
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::UnboundedSender<BodyChunk>,
}

impl BodySender {
    /// Append data. Empty chunks are skipped.
    pub fn push(&self, data: Bytes) {
        if !data.is_empty() {
            let _ = self.tx.send(BodyChunk::Data(data));
        }
    }

    /// Mark the body complete.
    pub fn finish(&self) {
        let _ = self.tx.send(BodyChunk::End);
    }

    /// Fail the body; a reader that has not reached the end gets an error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(BodyChunk::Error(reason.into()));
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    InternalServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete response: status, headers and body.
#[derive(Debug, Clone)]
pub struct Response {
    status: Status,
    headers: Vec<(&'static str, &'static str)>,
    body: Bytes,
}

impl Response {
    /// `200 OK` carrying the handler's bytes verbatim.
    pub fn ok(body: Bytes) -> Self {
        Self {
            status: Status::Ok,
            headers: vec![("Content-Type", JSON_CONTENT_TYPE)],
            body,
        }
    }

    /// A plain text error response.
    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![
                ("Content-Type", TEXT_CONTENT_TYPE),
                ("X-Content-Type-Options", "nosniff"),
            ],
            body: Bytes::from(message.into()),
        }
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn headers(&self) -> &[(&'static str, &'static str)] {
        &self.headers
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

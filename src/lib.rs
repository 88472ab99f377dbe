//! # funcwire
//!
//! Serve one ordinary Rust function to a web server over FastCGI.
//!
//! The application registers a single handler. Its shape is checked once at
//! start-up and wrapped in an adapter that decodes the request body as JSON,
//! calls the function, and encodes whatever it returns. A handler with an
//! unsupported shape does not abort start-up: every request answers with the
//! configuration error instead.
//!
//! ## Architecture
//!
//! - **Handler** ([`handler`]): signature descriptors, validation, the
//!   uniform `(Context, bytes) -> bytes` adapter
//! - **Server** ([`server`]): body in, status and body out
//! - **Transport** ([`fastcgi`], [`transport`]): FastCGI responder on the
//!   inherited socket, a Unix socket or TCP
//!
//! ## Example
//!
//! ```no_run
//! use funcwire::{BoxError, Context, RawHandler};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Greeting {
//!     #[serde(rename = "Name")]
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Reply {
//!     #[serde(rename = "Msg")]
//!     msg: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> funcwire::Result<()> {
//!     funcwire::start(RawHandler::function(|_ctx: Context, event: Greeting| async move {
//!         Ok::<_, BoxError>(Reply { msg: format!("hi {}", event.name) })
//!     }))
//!     .await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod fastcgi;
pub mod handler;
pub mod server;
pub mod transport;

use std::sync::Arc;

pub use codec::JsonOptions;
pub use config::ServeConfig;
pub use error::{BodyError, BoxError, ConfigError, FuncwireError, InvokeError, Result};
pub use handler::{Context, Function, Handler, RawHandler};
pub use server::{Server, ServerBuilder};
pub use transport::{ListenAddr, Listener};

/// Serve `handler` with configuration from the environment.
///
/// Reads [`ServeConfig::from_env`], normalizes the handler, binds the
/// listener and serves until accepting fails.
pub async fn start(handler: impl Into<RawHandler>) -> Result<()> {
    let config = ServeConfig::from_env()?;
    let server = Server::builder()
        .json_options(config.json.clone())
        .build(handler);

    let listener = Listener::bind(&config.listen).await?;
    tracing::info!("Serving on {}", config.listen);
    serve(listener, server).await
}

/// Accept connections on `listener` and serve each on its own task.
///
/// Connection errors are logged and affect only that connection. Returns
/// when accepting fails.
pub async fn serve(listener: Listener, server: Server) -> Result<()> {
    let server = Arc::new(server);
    loop {
        let (reader, writer) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = fastcgi::serve_connection(reader, writer, server).await {
                tracing::error!("Connection error: {}", e);
            }
        });
    }
}

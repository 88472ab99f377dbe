//! Uniform handler - raw bytes in, raw bytes out.
//!
//! A handler that already implements the uniform contract is served as is:
//! no JSON decoding or encoding happens. This one upper-cases the body.
//!
//! ```text
//! FUNCWIRE_LISTEN=unix:/tmp/uniform.sock cargo run --example uniform
//! ```

use bytes::Bytes;
use funcwire::handler::handler_fn;
use funcwire::{Context, InvokeError, ListenAddr, Listener, RawHandler, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let handler = handler_fn(|_ctx: Context, payload: Bytes| async move {
        let text = std::str::from_utf8(&payload).map_err(InvokeError::handler)?;
        Ok::<_, InvokeError>(Bytes::from(text.to_uppercase()))
    });
    let server = Server::new(RawHandler::uniform(handler));

    let addr = std::env::var("FUNCWIRE_LISTEN")
        .unwrap_or_default()
        .parse::<ListenAddr>()?;
    let listener = Listener::bind(&addr).await?;
    funcwire::serve(listener, server).await?;
    Ok(())
}

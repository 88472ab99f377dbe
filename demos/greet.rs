//! Greeter - a typed handler served over FastCGI.
//!
//! This example demonstrates:
//! - Registering a function that takes the context and a JSON event
//! - Returning a value or an error
//! - Installing a tracing subscriber
//!
//! # Running behind a web server
//!
//! ```text
//! FUNCWIRE_LISTEN=tcp:127.0.0.1:9000 cargo run --example greet
//! ```
//!
//! Point the web server's FastCGI upstream at `127.0.0.1:9000` and POST
//! `{"Name":"Bob"}`; the response body is `{"Msg":"hi Bob"}`.

use funcwire::{BoxError, Context, RawHandler};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
struct Greeting {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Serialize, Debug)]
struct Reply {
    #[serde(rename = "Msg")]
    msg: String,
}

async fn greet(ctx: Context, event: Greeting) -> Result<Reply, BoxError> {
    if ctx.is_cancelled() {
        return Err("cancelled".into());
    }
    if event.name.is_empty() {
        return Err("name is required".into());
    }
    Ok(Reply {
        msg: format!("hi {}", event.name),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,funcwire=debug".parse().unwrap()),
        )
        .init();

    funcwire::start(RawHandler::function(greet)).await?;
    Ok(())
}

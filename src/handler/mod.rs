//! Handler module - normalization of user functions.
//!
//! Provides:
//! - [`Handler`] - the uniform contract: context plus payload in, bytes out
//! - [`Function`] - a callable together with its [`Signature`]
//! - [`normalize`] - turns any [`RawHandler`] into a [`Handler`]
//! - [`Context`] - cancellation, deadline and request-scoped values
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use funcwire::handler::{normalize, RawHandler};
//! use funcwire::{BoxError, Context, JsonOptions};
//!
//! # tokio_test_block_on(async {
//! let handler = normalize(
//!     RawHandler::function(|name: String| async move {
//!         Ok::<_, BoxError>(format!("hello {name}"))
//!     }),
//!     &JsonOptions::default(),
//! );
//!
//! let out = handler
//!     .invoke(Context::background(), Bytes::from_static(b"\"Ann\""))
//!     .await
//!     .unwrap();
//! assert_eq!(&out[..], b"\"hello Ann\"");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod context;
mod function;
mod normalize;
mod signature;

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::InvokeError;

pub use context::Context;
pub use function::{Argument, CallFuture, Function, IntoFunction, Param, Payload, Returned, Returns};
pub use normalize::{normalize, RawHandler};
pub use signature::{AnyEvent, ArgKind, EventType, ReturnKind, Signature};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The uniform handler contract.
///
/// Implementations must be safe to invoke concurrently from many requests.
pub trait Handler: Send + Sync + 'static {
    /// Handle one invocation with the raw request payload.
    fn invoke(&self, ctx: Context, payload: Bytes) -> BoxFuture<'static, Result<Bytes, InvokeError>>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn invoke(&self, ctx: Context, payload: Bytes) -> BoxFuture<'static, Result<Bytes, InvokeError>> {
        (**self).invoke(ctx, payload)
    }
}

/// Wrapper turning a bytes-in bytes-out closure into a [`Handler`].
pub struct HandlerFn<F, Fut>
where
    F: Fn(Context, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, InvokeError>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> Handler for HandlerFn<F, Fut>
where
    F: Fn(Context, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, InvokeError>> + Send + 'static,
{
    fn invoke(&self, ctx: Context, payload: Bytes) -> BoxFuture<'static, Result<Bytes, InvokeError>> {
        Box::pin((self.handler)(ctx, payload))
    }
}

/// Build a uniform handler from a closure. The payload is passed through
/// untouched and the returned bytes become the response body.
pub fn handler_fn<F, Fut>(handler: F) -> HandlerFn<F, Fut>
where
    F: Fn(Context, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, InvokeError>> + Send + 'static,
{
    HandlerFn {
        handler,
        _phantom: PhantomData,
    }
}

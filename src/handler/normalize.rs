//! Handler normalization.
//!
//! [`normalize`] turns whatever the application registered into a single
//! [`Handler`]. It never fails: a value that cannot be invoked becomes a
//! handler that returns the configuration error on every call, so the
//! problem surfaces on the first request instead of at start-up.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use super::function::{Argument, Function, IntoFunction, Returned};
use super::signature::{validate_arguments, validate_returns, Shape};
use super::{BoxFuture, Context, Handler};
use crate::codec::JsonOptions;
use crate::error::{ConfigError, InvokeError};

/// The value registered as "the handler", before normalization.
#[derive(Clone)]
pub enum RawHandler {
    /// Nothing was registered.
    Nil,
    /// Already implements the uniform contract; used unchanged.
    Uniform(Arc<dyn Handler>),
    /// A callable with a signature descriptor.
    Function(Function),
    /// A value that is not callable, identified by its type name.
    Value { kind: &'static str },
}

impl RawHandler {
    /// Register a typed async closure or function.
    pub fn function<F, M>(f: F) -> Self
    where
        F: IntoFunction<M>,
    {
        Self::Function(f.into_function())
    }

    /// Register a handler that already implements [`Handler`].
    pub fn uniform<H: Handler>(handler: H) -> Self {
        Self::Uniform(Arc::new(handler))
    }

    /// Register an arbitrary value. It will be rejected as not callable.
    pub fn value<T: 'static>(_value: T) -> Self {
        Self::Value {
            kind: type_name::<T>(),
        }
    }
}

impl From<Function> for RawHandler {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<Arc<dyn Handler>> for RawHandler {
    fn from(handler: Arc<dyn Handler>) -> Self {
        Self::Uniform(handler)
    }
}

impl<H: Into<RawHandler>> From<Option<H>> for RawHandler {
    fn from(handler: Option<H>) -> Self {
        handler.map_or(Self::Nil, Into::into)
    }
}

impl fmt::Debug for RawHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("Nil"),
            Self::Uniform(_) => f.write_str("Uniform(..)"),
            Self::Function(function) => f.debug_tuple("Function").field(function).finish(),
            Self::Value { kind } => f.debug_struct("Value").field("kind", kind).finish(),
        }
    }
}

/// Build the uniform handler for `raw`.
///
/// The returned handler is immutable and safe to invoke concurrently.
pub fn normalize(raw: impl Into<RawHandler>, options: &JsonOptions) -> Arc<dyn Handler> {
    match raw.into() {
        RawHandler::Nil => failing(ConfigError::NilHandler),
        RawHandler::Uniform(handler) => handler,
        RawHandler::Value { kind } => failing(ConfigError::NotAFunction {
            kind: kind.to_string(),
        }),
        RawHandler::Function(function) => match adapt(function, options) {
            Ok(handler) => Arc::new(handler),
            Err(err) => failing(err),
        },
    }
}

fn adapt(function: Function, options: &JsonOptions) -> Result<FunctionHandler, ConfigError> {
    let shape = validate_arguments(function.signature())?;
    validate_returns(function.signature())?;
    Ok(FunctionHandler {
        inner: Arc::new(Adapter {
            function,
            shape,
            options: options.clone(),
        }),
    })
}

fn failing(err: ConfigError) -> Arc<dyn Handler> {
    tracing::warn!("handler rejected: {}", err);
    Arc::new(FailingHandler(err))
}

/// Handler that always fails with the same configuration error.
struct FailingHandler(ConfigError);

impl Handler for FailingHandler {
    fn invoke(&self, _ctx: Context, _payload: Bytes) -> BoxFuture<'static, Result<Bytes, InvokeError>> {
        let err = self.0.clone();
        Box::pin(async move { Err(InvokeError::Config(err)) })
    }
}

struct Adapter {
    function: Function,
    shape: Shape,
    options: JsonOptions,
}

/// Uniform adapter around a validated [`Function`].
struct FunctionHandler {
    inner: Arc<Adapter>,
}

impl Handler for FunctionHandler {
    fn invoke(&self, ctx: Context, payload: Bytes) -> BoxFuture<'static, Result<Bytes, InvokeError>> {
        let adapter = self.inner.clone();
        Box::pin(async move { adapter.invoke(ctx, &payload).await })
    }
}

impl Adapter {
    async fn invoke(&self, ctx: Context, payload: &[u8]) -> Result<Bytes, InvokeError> {
        let mut args = Vec::with_capacity(2);
        if self.shape.takes_context {
            args.push(Argument::Context(ctx));
        }
        if let Some(event) = &self.shape.event {
            args.push(Argument::Event(event.decode(payload)?));
        }

        let mut returned = self.function.call(args).await?;
        let declared = self.function.signature().returns.len();
        if returned.len() != declared {
            return Err(InvokeError::ReturnMismatch {
                expected: declared,
                got: returned.len(),
            });
        }

        // The error, if any, is always the last value.
        if let Some(Returned::Error(Some(_))) = returned.last() {
            if let Some(Returned::Error(Some(err))) = returned.pop() {
                return Err(InvokeError::Handler(err));
            }
        }

        let mut encoded = match returned.len() {
            n if n > 1 => match returned.swap_remove(0) {
                Returned::Value(payload) => payload.encode(&self.options)?,
                Returned::Error(_) => null(&self.options)?,
            },
            _ => null(&self.options)?,
        };

        // Clients built against the unconfigured encoder never saw its
        // trailing newline.
        if !self.options.is_indented() && encoded.last() == Some(&b'\n') {
            encoded.pop();
        }
        Ok(Bytes::from(encoded))
    }
}

fn null(options: &JsonOptions) -> Result<Vec<u8>, InvokeError> {
    crate::codec::JsonCodec::encode(&(), options).map_err(InvokeError::Encode)
}

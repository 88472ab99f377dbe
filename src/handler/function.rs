//! Callables with a signature descriptor.
//!
//! A [`Function`] pairs a type-erased call with the [`Signature`] it was
//! declared with. Ordinary async closures and functions become a `Function`
//! through [`IntoFunction`]; each parameter type reports its [`ArgKind`] via
//! [`Param`] and the output type reports its return kinds via [`Returns`].
//!
//! # Example
//!
//! ```
//! use funcwire::handler::{ArgKind, Function, ReturnKind};
//! use funcwire::{BoxError, Context};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     quantity: u32,
//! }
//!
//! #[derive(Serialize)]
//! struct Receipt {
//!     total: u32,
//! }
//!
//! let function = Function::new(|_ctx: Context, order: Order| async move {
//!     Ok::<_, BoxError>(Receipt { total: order.quantity * 3 })
//! });
//!
//! let signature = function.signature();
//! assert_eq!(signature.args[0], ArgKind::Context);
//! assert_eq!(signature.returns[1], ReturnKind::Error);
//! ```

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::signature::{AnyEvent, ArgKind, EventType, ReturnKind, Signature};
use super::{BoxFuture, Context};
use crate::codec::{JsonCodec, JsonOptions};
use crate::error::{BoxError, InvokeError};

/// One argument handed to a callable.
pub enum Argument {
    Context(Context),
    Event(AnyEvent),
}

/// One value produced by a callable.
pub enum Returned {
    /// A payload to encode.
    Value(Payload),
    /// The error slot; `None` means success.
    Error(Option<BoxError>),
}

/// A type-erased serializable value.
pub struct Payload(Box<dyn EncodePayload>);

impl Payload {
    pub fn new<T: Serialize + Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// The JSON `null` value.
    pub fn null() -> Self {
        Self::new(())
    }

    pub(crate) fn encode(&self, options: &JsonOptions) -> Result<Vec<u8>, InvokeError> {
        self.0.encode(options).map_err(InvokeError::Encode)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

trait EncodePayload: Send {
    fn encode(&self, options: &JsonOptions) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send> EncodePayload for T {
    fn encode(&self, options: &JsonOptions) -> serde_json::Result<Vec<u8>> {
        JsonCodec::encode(self, options)
    }
}

/// Future produced by a call.
pub type CallFuture = BoxFuture<'static, Result<Vec<Returned>, InvokeError>>;

type Call = Arc<dyn Fn(Vec<Argument>) -> CallFuture + Send + Sync>;

/// A callable plus its declared signature.
#[derive(Clone)]
pub struct Function {
    signature: Signature,
    call: Call,
}

impl Function {
    /// Build from a typed async closure or function.
    pub fn new<F, M>(f: F) -> Self
    where
        F: IntoFunction<M>,
    {
        f.into_function()
    }

    /// Build from an explicit signature and an untyped call.
    ///
    /// The call receives arguments in declaration order, limited to what the
    /// validated signature asks for.
    pub fn from_parts<C>(signature: Signature, call: C) -> Self
    where
        C: Fn(Vec<Argument>) -> CallFuture + Send + Sync + 'static,
    {
        Self {
            signature,
            call: Arc::new(call),
        }
    }

    /// The declared signature.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Invoke with already prepared arguments.
    pub fn call(&self, args: Vec<Argument>) -> CallFuture {
        (self.call)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A type usable as a handler parameter.
///
/// [`Context`] is the context parameter; every other `DeserializeOwned`
/// type is an event decoded from the payload.
pub trait Param: Send + Sized + 'static {
    fn kind() -> ArgKind;

    fn from_argument(arg: Argument) -> Option<Self>;
}

impl Param for Context {
    fn kind() -> ArgKind {
        ArgKind::Context
    }

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Context(ctx) => Some(ctx),
            Argument::Event(_) => None,
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> Param for T {
    fn kind() -> ArgKind {
        ArgKind::Event(EventType::of::<T>())
    }

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Event(event) => event.downcast::<T>().ok().map(|event| *event),
            Argument::Context(_) => None,
        }
    }
}

/// A type usable as a handler's output.
///
/// - `()` returns nothing
/// - `Result<(), E>` returns only an error
/// - `Result<T, E>` returns a payload and an error
pub trait Returns: Send + 'static {
    fn kinds() -> Vec<ReturnKind>;

    fn into_returned(self) -> Vec<Returned>;
}

impl Returns for () {
    fn kinds() -> Vec<ReturnKind> {
        Vec::new()
    }

    fn into_returned(self) -> Vec<Returned> {
        Vec::new()
    }
}

impl<T, E> Returns for Result<T, E>
where
    T: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn kinds() -> Vec<ReturnKind> {
        if is_unit::<T>() {
            vec![ReturnKind::Error]
        } else {
            vec![ReturnKind::Value(type_name::<T>()), ReturnKind::Error]
        }
    }

    fn into_returned(self) -> Vec<Returned> {
        let (value, error) = match self {
            Ok(value) => (Payload::new(value), None),
            Err(err) => (Payload::null(), Some(err.into())),
        };
        if is_unit::<T>() {
            vec![Returned::Error(error)]
        } else {
            vec![Returned::Value(value), Returned::Error(error)]
        }
    }
}

fn is_unit<T: Any>() -> bool {
    TypeId::of::<T>() == TypeId::of::<()>()
}

/// Conversion of a typed callable into a [`Function`].
///
/// Implemented for `Fn` closures and functions of up to three parameters
/// returning a future whose output implements [`Returns`]. Callables with
/// more than two parameters convert fine but are rejected when normalized.
pub trait IntoFunction<M>: Send + Sync + 'static {
    fn into_function(self) -> Function;
}

fn argument_mismatch(expected: &'static str) -> CallFuture {
    Box::pin(async move { Err(InvokeError::ArgumentMismatch { expected }) })
}

macro_rules! impl_into_function {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, $($ty,)*> IntoFunction<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: Returns,
            $($ty: Param,)*
        {
            fn into_function(self) -> Function {
                let signature = Signature::new(
                    vec![$(<$ty as Param>::kind()),*],
                    <Fut::Output as Returns>::kinds(),
                );
                Function::from_parts(signature, move |args: Vec<Argument>| -> CallFuture {
                    let mut args = args.into_iter();
                    $(
                        let $ty = match args.next().and_then(<$ty as Param>::from_argument) {
                            Some(value) => value,
                            None => return argument_mismatch(type_name::<$ty>()),
                        };
                    )*
                    let fut = self($($ty),*);
                    Box::pin(async move { Ok(fut.await.into_returned()) })
                })
            }
        }
    };
}

impl_into_function!();
impl_into_function!(T1);
impl_into_function!(T1, T2);
impl_into_function!(T1, T2, T3);

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Ping {
        n: u32,
    }

    fn event<T: DeserializeOwned + Send + 'static>() -> ArgKind {
        ArgKind::Event(EventType::of::<T>())
    }

    #[test]
    fn test_signature_no_args_no_returns() {
        let function = Function::new(|| async {});
        assert_eq!(function.signature(), &Signature::new(vec![], vec![]));
    }

    #[test]
    fn test_signature_context_only() {
        let function = Function::new(|_ctx: Context| async {});
        assert_eq!(function.signature().args, vec![ArgKind::Context]);
    }

    #[test]
    fn test_signature_error_only() {
        let function = Function::new(|_: Ping| async { Ok::<(), BoxError>(()) });
        assert_eq!(function.signature().args, vec![event::<Ping>()]);
        assert_eq!(function.signature().returns, vec![ReturnKind::Error]);
    }

    #[test]
    fn test_signature_payload_and_error() {
        let function = Function::new(|_ctx: Context, ping: Ping| async move {
            Ok::<_, BoxError>(ping.n)
        });
        assert_eq!(function.signature().args, vec![ArgKind::Context, event::<Ping>()]);
        assert_eq!(
            function.signature().returns,
            vec![ReturnKind::Value("u32"), ReturnKind::Error]
        );
    }

    #[test]
    fn test_signature_three_args() {
        let function = Function::new(|_: i32, _: i32, _: i32| async {});
        assert_eq!(function.signature().args.len(), 3);
    }

    #[tokio::test]
    async fn test_call_passes_arguments_in_order() {
        let function = Function::new(|ctx: Context, ping: Ping| async move {
            Ok::<_, BoxError>(format!("{} {}", ctx.value::<&str>().copied().unwrap_or(""), ping.n))
        });

        let ctx = Context::background().with_value("seen");
        let event = EventType::of::<Ping>().decode(br#"{"n":5}"#).unwrap();
        let returned = function
            .call(vec![Argument::Context(ctx), Argument::Event(event)])
            .await
            .unwrap();

        assert_eq!(returned.len(), 2);
        match &returned[0] {
            Returned::Value(payload) => {
                assert_eq!(payload.encode(&JsonOptions::default()).unwrap(), b"\"seen 5\"\n");
            }
            Returned::Error(_) => panic!("expected a payload first"),
        }
        assert!(matches!(returned[1], Returned::Error(None)));
    }

    #[tokio::test]
    async fn test_call_reports_user_error() {
        let function = Function::new(|| async { Err::<u8, _>("nope") });
        let returned = function.call(vec![]).await.unwrap();

        match returned.last() {
            Some(Returned::Error(Some(err))) => assert_eq!(err.to_string(), "nope"),
            _ => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_call_argument_mismatch() {
        let function = Function::new(|_: Ping| async {});
        let result = function.call(vec![Argument::Context(Context::background())]).await;
        assert!(matches!(result, Err(InvokeError::ArgumentMismatch { .. })));
    }

    #[tokio::test]
    async fn test_call_missing_argument() {
        let function = Function::new(|_ctx: Context| async {});
        let result = function.call(vec![]).await;
        assert!(matches!(result, Err(InvokeError::ArgumentMismatch { expected }) if expected.ends_with("Context")));
    }

    #[test]
    fn test_payload_null() {
        let payload = Payload::null();
        assert_eq!(payload.encode(&JsonOptions::default()).unwrap(), b"null\n");
    }
}

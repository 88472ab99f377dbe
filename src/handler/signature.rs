//! Signature descriptors and their validation.
//!
//! A [`Signature`] lists what a callable takes and what it returns. It is
//! built at registration time, either from the callable's Rust types or by
//! hand for dynamically assembled callables, and validated once during
//! normalization.

use std::any::{type_name, Any};
use std::fmt;

use serde::de::DeserializeOwned;

use crate::codec::JsonCodec;
use crate::error::{ConfigError, InvokeError};

/// A decoded event, type-erased until the callable downcasts it.
pub type AnyEvent = Box<dyn Any + Send>;

type DecodeFn = fn(&[u8]) -> Result<AnyEvent, InvokeError>;

/// The declared type of an event parameter.
///
/// Carries a decoder that allocates a fresh instance from JSON bytes.
#[derive(Clone, Copy)]
pub struct EventType {
    name: &'static str,
    decode: DecodeFn,
}

impl EventType {
    /// Describe the event type `T`.
    pub fn of<T: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            name: type_name::<T>(),
            decode: decode_any::<T>,
        }
    }

    /// Rust type name of the event.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode a payload into a new event instance.
    pub fn decode(&self, payload: &[u8]) -> Result<AnyEvent, InvokeError> {
        (self.decode)(payload)
    }
}

fn decode_any<T: DeserializeOwned + Send + 'static>(payload: &[u8]) -> Result<AnyEvent, InvokeError> {
    let event: T = JsonCodec::decode(payload)?;
    Ok(Box::new(event))
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventType").field(&self.name).finish()
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventType {}

/// Kind of one declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// The invocation [`Context`](crate::Context).
    Context,
    /// A value decoded from the request payload.
    Event(EventType),
}

impl ArgKind {
    /// Human readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgKind::Context => "Context",
            ArgKind::Event(event) => event.name(),
        }
    }
}

/// Kind of one declared return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// A failure outcome.
    Error,
    /// A plain value, named by its Rust type.
    Value(&'static str),
}

/// Parameters and return values of a callable, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub args: Vec<ArgKind>,
    pub returns: Vec<ReturnKind>,
}

impl Signature {
    pub fn new(args: Vec<ArgKind>, returns: Vec<ReturnKind>) -> Self {
        Self { args, returns }
    }
}

/// The part of a validated signature the adapter switches on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shape {
    pub(crate) takes_context: bool,
    pub(crate) event: Option<EventType>,
}

/// Check the parameter list: at most two, and a leading Context when two.
pub(crate) fn validate_arguments(signature: &Signature) -> Result<Shape, ConfigError> {
    let args = &signature.args;
    if args.len() > 2 {
        return Err(ConfigError::TooManyArguments { count: args.len() });
    }

    let takes_context = matches!(args.first(), Some(ArgKind::Context));
    if args.len() > 1 && !takes_context {
        return Err(ConfigError::FirstArgumentNotContext {
            got: args[0].type_name().to_string(),
        });
    }

    let event = match args.as_slice() {
        [ArgKind::Event(event)] | [ArgKind::Context, ArgKind::Event(event)] => Some(*event),
        [ArgKind::Context, ArgKind::Context] => return Err(ConfigError::ContextAsEvent),
        _ => None,
    };

    Ok(Shape {
        takes_context,
        event,
    })
}

/// Check the return list: at most two, and the last one must be an error.
pub(crate) fn validate_returns(signature: &Signature) -> Result<(), ConfigError> {
    match signature.returns.as_slice() {
        [] => Ok(()),
        [ReturnKind::Error] => Ok(()),
        [_] => Err(ConfigError::SingleReturnNotError),
        [_, ReturnKind::Error] => Ok(()),
        [_, _] => Err(ConfigError::SecondReturnNotError),
        returns => Err(ConfigError::TooManyReturns {
            count: returns.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event<T: DeserializeOwned + Send + 'static>() -> ArgKind {
        ArgKind::Event(EventType::of::<T>())
    }

    fn args(args: Vec<ArgKind>) -> Signature {
        Signature::new(args, vec![])
    }

    fn returns(returns: Vec<ReturnKind>) -> Signature {
        Signature::new(vec![], returns)
    }

    #[test]
    fn test_no_arguments() {
        let shape = validate_arguments(&args(vec![])).unwrap();
        assert!(!shape.takes_context);
        assert!(shape.event.is_none());
    }

    #[test]
    fn test_single_context() {
        let shape = validate_arguments(&args(vec![ArgKind::Context])).unwrap();
        assert!(shape.takes_context);
        assert!(shape.event.is_none());
    }

    #[test]
    fn test_single_event() {
        let shape = validate_arguments(&args(vec![event::<String>()])).unwrap();
        assert!(!shape.takes_context);
        assert_eq!(shape.event, Some(EventType::of::<String>()));
    }

    #[test]
    fn test_context_and_event() {
        let shape = validate_arguments(&args(vec![ArgKind::Context, event::<u8>()])).unwrap();
        assert!(shape.takes_context);
        assert_eq!(shape.event.unwrap().name(), "u8");
    }

    #[test]
    fn test_two_events_rejected() {
        let err = validate_arguments(&args(vec![event::<i32>(), event::<i32>()])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "handler takes two arguments, but the first is not Context. got i32"
        );
    }

    #[test]
    fn test_two_contexts_rejected() {
        let err = validate_arguments(&args(vec![ArgKind::Context, ArgKind::Context])).unwrap_err();
        assert_eq!(err, ConfigError::ContextAsEvent);
    }

    #[test]
    fn test_three_arguments_rejected() {
        let err = validate_arguments(&args(vec![event::<i32>(); 3])).unwrap_err();
        assert_eq!(err, ConfigError::TooManyArguments { count: 3 });
    }

    #[test]
    fn test_returns_accepted() {
        assert!(validate_returns(&returns(vec![])).is_ok());
        assert!(validate_returns(&returns(vec![ReturnKind::Error])).is_ok());
        assert!(validate_returns(&returns(vec![ReturnKind::Value("String"), ReturnKind::Error])).is_ok());
    }

    #[test]
    fn test_single_value_return_rejected() {
        let err = validate_returns(&returns(vec![ReturnKind::Value("String")])).unwrap_err();
        assert_eq!(err, ConfigError::SingleReturnNotError);
    }

    #[test]
    fn test_second_return_not_error_rejected() {
        let err = validate_returns(&returns(vec![ReturnKind::Error, ReturnKind::Value("u8")])).unwrap_err();
        assert_eq!(err, ConfigError::SecondReturnNotError);
    }

    #[test]
    fn test_three_returns_rejected() {
        let err = validate_returns(&returns(vec![ReturnKind::Error; 3])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "handler may not return more than two values"
        );
    }

    #[test]
    fn test_event_type_decodes_fresh_instance() {
        let event = EventType::of::<Vec<u8>>();
        let decoded = event.decode(b"[1,2,3]").unwrap();
        assert_eq!(*decoded.downcast::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
    }
}

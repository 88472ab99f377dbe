//! Invocation context for handlers.
//!
//! A [`Context`] carries:
//! - a cancellation signal
//! - an optional deadline
//! - typed request-scoped values
//!
//! The server owns one base context and passes a clone of it into every
//! invocation. Handlers opt in by declaring a `Context` parameter.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use funcwire::Context;
//!
//! #[derive(Debug, PartialEq)]
//! struct Region(&'static str);
//!
//! let ctx = Context::background()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_value(Region("eu-west-1"));
//!
//! assert_eq!(ctx.value::<Region>(), Some(&Region("eu-west-1")));
//! assert!(ctx.deadline().is_some());
//! assert!(!ctx.is_cancelled());
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Values = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Cancellation, deadline and value carrier passed to handlers.
///
/// `Context` is cheap to clone; clones share the same cancellation token.
#[derive(Clone, Default)]
pub struct Context {
    /// Cancellation signal shared by all clones.
    token: CancellationToken,
    /// Point in time after which work should stop.
    deadline: Option<Instant>,
    /// Request-scoped values keyed by type.
    values: Arc<Values>,
}

impl Context {
    /// An empty context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Replace the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a value, replacing any previous value of the same type.
    pub fn with_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        self.values = Arc::new(values);
        self
    }

    /// Look up a value by type.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// The deadline, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The underlying cancellation token.
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the context was cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_not_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_values_by_type() {
        let ctx = Context::background().with_value(7u32).with_value("name");

        assert_eq!(ctx.value::<u32>(), Some(&7));
        assert_eq!(ctx.value::<&str>(), Some(&"name"));
        assert!(ctx.value::<i64>().is_none());
    }

    #[test]
    fn test_with_value_does_not_affect_parent() {
        let parent = Context::background().with_value(1u8);
        let child = parent.clone().with_value(2u8);

        assert_eq!(parent.value::<u8>(), Some(&1));
        assert_eq!(child.value::<u8>(), Some(&2));
    }

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = Context::background();
        let clone = ctx.clone();

        ctx.cancellation_token().cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_done_on_cancel() {
        let token = CancellationToken::new();
        let ctx = Context::background().with_cancellation(token.clone());

        let waiter = tokio::spawn(async move { ctx.done().await });
        token.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_cancelled());

        ctx.done().await;
        assert!(ctx.is_cancelled());
    }
}

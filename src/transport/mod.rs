//! Transport module - where connections from the host come from.
//!
//! Provides abstraction over:
//! - The listening socket inherited as fd 0
//! - Unix Domain Sockets bound to a path
//! - TCP

mod listener;

pub use listener::{BoxedReader, BoxedWriter, ListenAddr, Listener};

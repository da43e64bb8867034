//! Event handlers and the registry that binds them to (event kind, payload kind) pairs.
//!
//! The registry is filled once at startup and only read afterwards, so the
//! dispatcher shares it behind an `Arc` without locking.

mod echo;
mod registry;

pub use echo::EchoHandler;
pub use registry::{EventHandler, HandlerError, HandlerKey, HandlerRegistry, RegistryError};

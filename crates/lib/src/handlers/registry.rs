//! Handler registry: register and look up handlers by (event kind, payload kind).

use crate::events::{EventKind, InboundEvent, PayloadKind};
use crate::reply::ReplyError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A unit of logic bound to one (event kind, payload kind) pair.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in logs (e.g. "echo").
    fn name(&self) -> &str;
    /// Handle one event. Errors are logged by the dispatcher and never reach siblings.
    async fn handle(&self, event: InboundEvent) -> Result<(), HandlerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("event has no reply token")]
    MissingReplyToken,
    #[error("unexpected payload for this handler: {0}")]
    UnexpectedPayload(String),
    #[error(transparent)]
    Reply(#[from] ReplyError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler is already registered for {0}")]
    Duplicate(HandlerKey),
    #[error("cannot register a handler for unsupported kind {0}")]
    Unsupported(HandlerKey),
}

/// Registry key. `payload` is `None` for event kinds without a payload (follow, join, ...).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct HandlerKey {
    pub kind: EventKind,
    pub payload: Option<PayloadKind>,
}

impl HandlerKey {
    pub fn new(kind: EventKind, payload: Option<PayloadKind>) -> Self {
        Self { kind, payload }
    }

    fn is_supported(&self) -> bool {
        self.kind.is_supported() && self.payload.as_ref().map_or(true, PayloadKind::is_supported)
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(p) => write!(f, "({}, {})", self.kind, p),
            None => write!(f, "({})", self.kind),
        }
    }
}

/// Static mapping from (kind, payload kind) to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to the pair. Registering a pair twice is an error so startup can fail fast.
    pub fn register(
        &mut self,
        kind: EventKind,
        payload: Option<PayloadKind>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RegistryError> {
        let key = HandlerKey::new(kind, payload);
        if !key.is_supported() {
            return Err(RegistryError::Unsupported(key));
        }
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }
        log::debug!("registered handler {} for {}", handler.name(), key);
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn lookup(
        &self,
        kind: &EventKind,
        payload: Option<&PayloadKind>,
    ) -> Option<Arc<dyn EventHandler>> {
        let key = HandlerKey::new(kind.clone(), payload.cloned());
        if !key.is_supported() {
            return None;
        }
        self.handlers.get(&key).cloned()
    }

    /// Handler for a decoded event, if any.
    pub fn lookup_event(&self, event: &InboundEvent) -> Option<Arc<dyn EventHandler>> {
        self.lookup(&event.kind, event.payload_kind().as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

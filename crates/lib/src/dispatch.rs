//! Dispatcher: runs each decoded event through its registered handler, in order.
//!
//! A failing or panicking handler only affects its own event; the rest of the
//! batch is still dispatched. Events with no handler are skipped.

use crate::events::InboundEvent;
use crate::handlers::{HandlerError, HandlerRegistry};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch a batch. `delivery_id` only tags log lines.
    pub async fn dispatch(&self, delivery_id: &str, events: Vec<InboundEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for (index, event) in events.into_iter().enumerate() {
            let Some(handler) = self.registry.lookup_event(&event) else {
                log::debug!(
                    "delivery {}: event {} ({}) has no handler, skipping",
                    delivery_id,
                    index,
                    describe(&event)
                );
                report.skipped += 1;
                continue;
            };
            let what = describe(&event);
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => report.handled += 1,
                Ok(Err(HandlerError::Reply(e))) => {
                    log::warn!(
                        "delivery {}: event {} ({}): reply via {} failed: {}",
                        delivery_id,
                        index,
                        what,
                        handler.name(),
                        e
                    );
                    report.failed += 1;
                }
                Ok(Err(e)) => {
                    log::warn!(
                        "delivery {}: event {} ({}): handler {} failed: {}",
                        delivery_id,
                        index,
                        what,
                        handler.name(),
                        e
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    log::error!(
                        "delivery {}: event {} ({}): handler {} panicked",
                        delivery_id,
                        index,
                        what,
                        handler.name()
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

fn describe(event: &InboundEvent) -> String {
    match event.payload_kind() {
        Some(p) => format!("{}/{}", event.kind, p),
        None => event.kind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Payload, PayloadKind};
    use crate::handlers::EventHandler;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every content it sees; fails on "fail" and panics on "panic".
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, event: InboundEvent) -> Result<(), HandlerError> {
            let text = event.text().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(text.clone());
            match text.as_str() {
                "fail" => Err(HandlerError::Other("boom".into())),
                "panic" => panic!("handler panicked"),
                _ => Ok(()),
            }
        }
    }

    fn text(content: &str) -> InboundEvent {
        InboundEvent {
            kind: EventKind::Message,
            payload: Some(Payload::Text {
                content: content.to_string(),
            }),
            reply_token: Some(format!("tok-{}", content)),
        }
    }

    fn dispatcher_with(handler: Arc<Recording>) -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry
            .register(EventKind::Message, Some(PayloadKind::Text), handler)
            .unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_events() {
        let handler = Arc::new(Recording::default());
        let dispatcher = dispatcher_with(handler.clone());
        let events = vec![text("a"), text("fail"), text("b"), text("c")];
        let report = dispatcher.dispatch("d1", events).await;

        assert_eq!(*handler.seen.lock().unwrap(), ["a", "fail", "b", "c"]);
        assert_eq!(
            report,
            DispatchReport {
                handled: 3,
                skipped: 0,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn panic_is_contained_to_its_event() {
        let handler = Arc::new(Recording::default());
        let dispatcher = dispatcher_with(handler.clone());
        let report = dispatcher
            .dispatch("d2", vec![text("panic"), text("after")])
            .await;

        assert_eq!(*handler.seen.lock().unwrap(), ["panic", "after"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.handled, 1);
    }

    #[tokio::test]
    async fn unmatched_and_unsupported_events_are_skipped() {
        let handler = Arc::new(Recording::default());
        let dispatcher = dispatcher_with(handler.clone());
        let events = vec![
            InboundEvent {
                kind: EventKind::Join,
                payload: None,
                reply_token: Some("j".into()),
            },
            InboundEvent {
                kind: EventKind::Unsupported("memberJoined".into()),
                payload: None,
                reply_token: None,
            },
            InboundEvent {
                kind: EventKind::Message,
                payload: Some(Payload::Other(PayloadKind::Unsupported("hologram".into()))),
                reply_token: Some("h".into()),
            },
            text("x"),
        ];
        let report = dispatcher.dispatch("d3", events).await;

        assert_eq!(*handler.seen.lock().unwrap(), ["x"]);
        assert_eq!(
            report,
            DispatchReport {
                handled: 1,
                skipped: 3,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let handler = Arc::new(Recording::default());
        let dispatcher = dispatcher_with(handler.clone());
        let report = dispatcher.dispatch("d4", Vec::new()).await;
        assert_eq!(report, DispatchReport::default());
        assert!(handler.seen.lock().unwrap().is_empty());
    }
}

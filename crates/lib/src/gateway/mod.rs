//! Gateway: HTTP boundary for webhook deliveries.
//!
//! Verifies each delivery's signature, answers right away, and leaves the
//! events to the ingest worker.

mod server;

pub use server::{default_registry, handle_webhook, router, run_gateway, GatewayState, WEBHOOK_PATH};

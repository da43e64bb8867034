//! linehook core library: signed webhook ingestion, event decoding, handler
//! dispatch, and the reply gateway client, used by the `linehook` CLI.

pub mod config;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod ingest;
pub mod reply;
pub mod signature;

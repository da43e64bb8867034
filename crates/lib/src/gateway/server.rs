//! Gateway HTTP server: webhook endpoint and liveness probe.

use crate::config::{self, Config, SharedSecret};
use crate::dispatch::Dispatcher;
use crate::events::{EventKind, PayloadKind};
use crate::handlers::{EchoHandler, HandlerRegistry};
use crate::ingest::{IngestHandle, Ingestor};
use crate::reply::{LineReplyClient, ReplyGateway};
use crate::signature::{self, SIGNATURE_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Path the platform delivers webhooks to.
pub const WEBHOOK_PATH: &str = "/callback";

/// Shared state for the gateway: the channel secret and the ingest queue.
#[derive(Clone)]
pub struct GatewayState {
    pub secret: SharedSecret,
    pub ingest: IngestHandle,
}

impl GatewayState {
    pub fn new(secret: SharedSecret, ingest: IngestHandle) -> Self {
        Self { secret, ingest }
    }
}

/// Registry with the built-in handlers: text messages are echoed back.
pub fn default_registry(gateway: Arc<dyn ReplyGateway>) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry
        .register(
            EventKind::Message,
            Some(PayloadKind::Text),
            Arc::new(EchoHandler::new(gateway)),
        )
        .context("registering echo handler")?;
    Ok(registry)
}

/// Routes: POST /callback (webhook), GET /health (liveness).
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_http))
        .route(WEBHOOK_PATH, post(webhook_http))
        .with_state(state)
}

/// Verify the signature and queue the body. 403 when the signature is missing or wrong;
/// otherwise 200 without waiting for any processing.
pub fn handle_webhook(state: &GatewayState, headers: &HeaderMap, body: Bytes) -> StatusCode {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !signature::verify(&body, state.secret.as_bytes(), provided) {
        if provided.is_empty() {
            log::warn!("webhook rejected: missing {} header", SIGNATURE_HEADER);
        } else {
            log::warn!("webhook rejected: signature mismatch (check the channel secret)");
        }
        return StatusCode::FORBIDDEN;
    }
    log::debug!("request body: {}", String::from_utf8_lossy(&body));
    state.ingest.submit(body);
    StatusCode::OK
}

/// POST /callback
async fn webhook_http(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    handle_webhook(&state, &headers, body)
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port.
/// Fails before binding when the channel secret or access token is missing.
/// Blocks until shutdown (Ctrl+C or SIGTERM), then drains in-flight deliveries.
pub async fn run_gateway(config: Config) -> Result<()> {
    let credentials = config::resolve_credentials(&config)?;
    let reply_client = LineReplyClient::new(
        credentials.access_token.clone(),
        config::resolve_api_base(&config),
    );
    log::info!("reply api: {}", reply_client.base_url());

    let registry = default_registry(Arc::new(reply_client))?;
    log::info!("registered {} event handler(s)", registry.len());
    let ingestor = Ingestor::start(Dispatcher::new(Arc::new(registry)));
    let state = GatewayState::new(credentials.channel_secret, ingestor.handle());
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook path {})", bind_addr, WEBHOOK_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    log::info!("draining in-flight deliveries");
    let drained = ingestor
        .shutdown(Duration::from_secs(config.gateway.drain_timeout_secs))
        .await;
    log::info!("gateway stopped (drained: {})", drained);
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, no longer accepting webhooks");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn state_with_secret(secret: &str) -> (GatewayState, Ingestor) {
        let ingestor = Ingestor::start(Dispatcher::new(Arc::new(HandlerRegistry::new())));
        let state = GatewayState::new(SharedSecret::new(secret).unwrap(), ingestor.handle());
        (state, ingestor)
    }

    fn signed_headers(sig: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(sig).unwrap());
        headers
    }

    #[tokio::test]
    async fn valid_signature_is_acknowledged() {
        let (state, ingestor) = state_with_secret("s3cret");
        let body = Bytes::from_static(br#"{"events":[]}"#);
        let headers = signed_headers(&signature::sign(&body, b"s3cret"));
        assert_eq!(handle_webhook(&state, &headers, body), StatusCode::OK);
        assert!(ingestor.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn missing_or_wrong_signature_is_forbidden() {
        let (state, _ingestor) = state_with_secret("s3cret");
        let body = Bytes::from_static(br#"{"events":[]}"#);
        assert_eq!(
            handle_webhook(&state, &HeaderMap::new(), body.clone()),
            StatusCode::FORBIDDEN
        );
        let headers = signed_headers(&signature::sign(&body, b"other"));
        assert_eq!(handle_webhook(&state, &headers, body), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn acknowledges_even_when_worker_is_gone() {
        let (state, ingestor) = state_with_secret("k");
        assert!(ingestor.shutdown(Duration::from_secs(5)).await);
        let body = Bytes::from_static(b"garbage");
        let headers = signed_headers(&signature::sign(&body, b"k"));
        assert_eq!(handle_webhook(&state, &headers, body), StatusCode::OK);
    }

    #[test]
    fn default_registry_binds_echo_to_text_messages() {
        let client = Arc::new(LineReplyClient::new("t", None));
        let registry = default_registry(client).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry
            .lookup(&EventKind::Message, Some(&PayloadKind::Text))
            .is_some());
    }
}

//! Reply gateway: sends a text reply for an event using its reply token.
//!
//! `LineReplyClient` talks to the Messaging API (`POST /v2/bot/message/reply`).
//! Errors are returned to the caller as-is; nothing here retries.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

const LINE_API_BASE: &str = "https://api.line.me";
const REPLY_PATH: &str = "/v2/bot/message/reply";

/// Outbound side of the pipeline, implemented by the platform client and by test doubles.
#[async_trait]
pub trait ReplyGateway: Send + Sync {
    /// Reply to the event identified by `reply_token` with a single text message.
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), ReplyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reply token is invalid or expired: {0}")]
    InvalidToken(String),
    #[error("access token rejected ({0})")]
    Unauthorized(StatusCode),
    #[error("rate limited by platform: {0}")]
    RateLimited(String),
    #[error("reply api error: {status} {body}")]
    Api { status: StatusCode, body: String },
    #[error("reply request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    typ: &'static str,
    text: &'a str,
}

/// Messaging API client holding the channel access token.
#[derive(Clone)]
pub struct LineReplyClient {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
}

impl LineReplyClient {
    pub fn new(access_token: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            base_url,
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReplyGateway for LineReplyClient {
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), ReplyError> {
        let url = format!("{}{}", self.base_url, REPLY_PATH);
        let body = ReplyRequest {
            reply_token,
            messages: [TextMessage { typ: "text", text }],
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

/// Map a non-success reply response onto `ReplyError`.
fn classify_failure(status: StatusCode, body: String) -> ReplyError {
    match status {
        StatusCode::BAD_REQUEST if body.to_ascii_lowercase().contains("reply token") => {
            ReplyError::InvalidToken(body)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ReplyError::Unauthorized(status),
        StatusCode::TOO_MANY_REQUESTS => ReplyError::RateLimited(body),
        _ => ReplyError::Api { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Seen {
        requests: Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>,
    }

    async fn fake_reply(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (axum::http::StatusCode, String) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        seen.requests.lock().unwrap().push((auth, body.clone()));
        match body["replyToken"].as_str() {
            Some("expired") => (
                axum::http::StatusCode::BAD_REQUEST,
                r#"{"message":"Invalid reply token"}"#.to_string(),
            ),
            Some("busy") => (
                axum::http::StatusCode::TOO_MANY_REQUESTS,
                r#"{"message":"Too many requests"}"#.to_string(),
            ),
            _ => (axum::http::StatusCode::OK, "{}".to_string()),
        }
    }

    async fn start_fake_api() -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(REPLY_PATH, post(fake_reply))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}/", addr), seen)
    }

    #[test]
    fn base_url_defaults_and_trims() {
        assert_eq!(LineReplyClient::new("t", None).base_url(), LINE_API_BASE);
        assert_eq!(
            LineReplyClient::new("t", Some("http://localhost:9/".to_string())).base_url(),
            "http://localhost:9"
        );
    }

    #[test]
    fn classify_failure_maps_platform_errors() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "Invalid reply token".into()),
            ReplyError::InvalidToken(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "bad message".into()),
            ReplyError::Api { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, String::new()),
            ReplyError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ReplyError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            ReplyError::Api { .. }
        ));
    }

    #[tokio::test]
    async fn send_reply_posts_text_message_with_bearer_token() {
        let (base, seen) = start_fake_api().await;
        let client = LineReplyClient::new("access-123", Some(base));
        client.send_reply("T1", "hi").await.unwrap();

        let requests = seen.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer access-123"));
        assert_eq!(
            body,
            &serde_json::json!({
                "replyToken": "T1",
                "messages": [{ "type": "text", "text": "hi" }]
            })
        );
    }

    #[tokio::test]
    async fn send_reply_surfaces_expired_token_and_rate_limit() {
        let (base, _seen) = start_fake_api().await;
        let client = LineReplyClient::new("access", Some(base));
        let err = client.send_reply("expired", "hi").await.unwrap_err();
        assert!(matches!(err, ReplyError::InvalidToken(_)));
        let err = client.send_reply("busy", "hi").await.unwrap_err();
        assert!(matches!(err, ReplyError::RateLimited(_)));
    }

    #[tokio::test]
    async fn send_reply_surfaces_network_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = LineReplyClient::new("access", Some(format!("http://127.0.0.1:{}", port)));
        let err = client.send_reply("T", "hi").await.unwrap_err();
        assert!(matches!(err, ReplyError::Request(_)));
    }
}

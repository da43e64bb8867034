//! Echo handler: replies to a text message with the same text.

use super::registry::{EventHandler, HandlerError};
use crate::events::{InboundEvent, Payload};
use crate::reply::ReplyGateway;
use async_trait::async_trait;
use std::sync::Arc;

pub struct EchoHandler {
    gateway: Arc<dyn ReplyGateway>,
}

impl EchoHandler {
    pub fn new(gateway: Arc<dyn ReplyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl EventHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, event: InboundEvent) -> Result<(), HandlerError> {
        let token = event.reply_token.ok_or(HandlerError::MissingReplyToken)?;
        let content = match event.payload {
            Some(Payload::Text { content }) => content,
            Some(Payload::Other(kind)) => {
                return Err(HandlerError::UnexpectedPayload(kind.to_string()))
            }
            None => return Err(HandlerError::UnexpectedPayload("none".to_string())),
        };
        self.gateway.send_reply(&token, &content).await?;
        Ok(())
    }
}

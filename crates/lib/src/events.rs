//! Inbound webhook events and the decoder for verified request bodies.
//!
//! A body is a JSON object with an `events` array. Each event carries a `kind`
//! and, for messages, a `payloadKind`, `replyToken` and (for text) `content`.
//! The platform-native nesting (`type`, `message.type`, `message.text`) is
//! accepted as well. Kinds this crate does not know decode to `Unsupported`
//! instead of failing the batch.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// What happened: the first-level discriminator of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Follow,
    Unfollow,
    Join,
    Leave,
    Postback,
    Unsupported(String),
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "message" => Self::Message,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "postback" => Self::Postback,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Postback => "postback",
            Self::Unsupported(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a message event's content: the second-level discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Location,
    Sticker,
    Unsupported(String),
}

impl PayloadKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "file" => Self::File,
            "location" => Self::Location,
            "sticker" => Self::Sticker,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Location => "location",
            Self::Sticker => "sticker",
            Self::Unsupported(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of a message event. Only text is carried; other kinds keep just their tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text { content: String },
    Other(PayloadKind),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Text { .. } => PayloadKind::Text,
            Self::Other(kind) => kind.clone(),
        }
    }
}

/// One decoded unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub kind: EventKind,
    /// Present for message events only.
    pub payload: Option<Payload>,
    /// Single-use token for replying; absent for kinds that cannot be answered (e.g. unfollow).
    pub reply_token: Option<String>,
}

impl InboundEvent {
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        self.payload.as_ref().map(Payload::kind)
    }

    /// Text content when this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Some(Payload::Text { content }) => Some(content),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("webhook body is not a valid event list: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event {index} ({kind}) is missing required field `{field}`")]
    MissingField {
        index: usize,
        kind: String,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    events: Vec<Map<String, Value>>,
}

/// Decode a verified body into events, preserving their order.
pub fn decode(body: &[u8]) -> Result<Vec<InboundEvent>, DecodeError> {
    let parsed: WebhookBody = serde_json::from_slice(body)?;
    parsed
        .events
        .into_iter()
        .enumerate()
        .map(|(index, obj)| decode_event(index, obj))
        .collect()
}

fn decode_event(index: usize, obj: Map<String, Value>) -> Result<InboundEvent, DecodeError> {
    let missing = |kind: &str, field: &'static str| DecodeError::MissingField {
        index,
        kind: kind.to_string(),
        field,
    };
    let kind_name: String = match obj.get("kind").or_else(|| obj.get("type")) {
        Some(v) => serde_json::from_value(v.clone())?,
        None => return Err(missing("unknown", "kind")),
    };
    let kind = EventKind::from_name(&kind_name);
    // Unsupported kinds are not inspected further, whatever their other fields hold.
    if !kind.is_supported() {
        return Ok(InboundEvent {
            kind,
            payload: None,
            reply_token: None,
        });
    }

    let reply_token = string_field(obj.get("replyToken"))?;
    if kind != EventKind::Message {
        return Ok(InboundEvent {
            kind,
            payload: None,
            reply_token,
        });
    }

    // Flat fields first, then the platform-native `message` object.
    let nested = obj.get("message").and_then(Value::as_object);
    let reply_token = reply_token.ok_or_else(|| missing(&kind_name, "replyToken"))?;
    let payload_name = match string_field(obj.get("payloadKind"))? {
        Some(name) => name,
        None => string_field(nested.and_then(|m| m.get("type")))?
            .ok_or_else(|| missing(&kind_name, "payloadKind"))?,
    };
    let payload = match PayloadKind::from_name(&payload_name) {
        PayloadKind::Text => {
            let content = match string_field(obj.get("content"))? {
                Some(c) => c,
                None => string_field(nested.and_then(|m| m.get("text")))?
                    .ok_or_else(|| missing(&kind_name, "content"))?,
            };
            Payload::Text { content }
        }
        other => Payload::Other(other),
    };
    Ok(InboundEvent {
        kind,
        payload: Some(payload),
        reply_token: Some(reply_token),
    })
}

/// Absent and `null` are both `None`; any other non-string value is malformed.
fn string_field(value: Option<&Value>) -> Result<Option<String>, DecodeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
    }
}

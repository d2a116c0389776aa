//! Wire envelopes exchanged over an agent chat channel.
//!
//! Outbound frames are always `{"message": <string>}`; RPC-style calls put a
//! JSON-encoded payload into that string. Inbound frames carry an object
//! `{"type": ..., "text": ...}` under `message`, where `text` may be a plain
//! string or a structured object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Discriminant of the only inbound frames that carry a final answer.
pub const AI_MESSAGE_TYPE: &str = "AI";

/// Outbound envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message: String,
    /// JSON-encoded side-channel dictionary forwarded to the agent request
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sly_data: Option<String>,
}

impl OutboundMessage {
    /// A plain user utterance.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message: text.into(),
            sly_data: None,
        }
    }

    /// A structured request, carried as a JSON string inside `message`.
    pub fn payload(payload: &Value) -> Result<Self> {
        Ok(Self {
            message: serde_json::to_string(payload)?,
            sly_data: None,
        })
    }

    pub fn with_sly_data(mut self, sly_data: &Map<String, Value>) -> Result<Self> {
        if !sly_data.is_empty() {
            self.sly_data = Some(serde_json::to_string(sly_data)?);
        }
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound `text` field, decoded explicitly at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageText {
    Raw(String),
    Structured(Map<String, Value>),
}

impl MessageText {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(MessageText::Raw(s)),
            Value::Object(map) => Some(MessageText::Structured(map)),
            other => Some(MessageText::Raw(other.to_string())),
        }
    }

    /// Text suitable for a transcript entry.
    pub fn to_display(&self) -> String {
        match self {
            MessageText::Raw(s) => s.clone(),
            MessageText::Structured(map) => {
                serde_json::to_string(map).unwrap_or_default()
            }
        }
    }

    /// Structured value of the reply: raw strings are parsed as JSON.
    pub fn into_json(self) -> Result<Value> {
        match self {
            MessageText::Raw(s) => Ok(serde_json::from_str(&s)?),
            MessageText::Structured(map) => Ok(Value::Object(map)),
        }
    }
}

/// The object found under `message` in an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMessage {
    pub kind: Option<String>,
    pub text: Option<MessageText>,
}

impl AgentMessage {
    pub fn is_ai(&self) -> bool {
        self.kind.as_deref() == Some(AI_MESSAGE_TYPE)
    }

    /// Untyped replies are treated as final, like `AI` ones.
    pub fn is_final(&self) -> bool {
        self.kind.is_none() || self.is_ai()
    }
}

/// Classification of one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `message` is an object
    Agent(AgentMessage),
    /// `message` is missing or not an object (informational)
    Unstructured,
}

impl InboundFrame {
    /// Parse a raw text frame. Fails only when the frame is not JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut envelope) = value else {
            return InboundFrame::Unstructured;
        };
        match envelope.remove("message") {
            Some(Value::Object(mut message)) => {
                let kind = match message.remove("type") {
                    Some(Value::String(s)) => Some(s),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                };
                let text = message.remove("text").and_then(MessageText::from_value);
                InboundFrame::Agent(AgentMessage { kind, text })
            }
            _ => InboundFrame::Unstructured,
        }
    }
}

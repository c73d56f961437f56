//! Wire types exchanged with the chat backend.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a `POST /api/chat` request.
///
/// `conversation_id` is opaque to this crate and forwarded unchanged; it is
/// omitted from the JSON body when absent so the request stays
/// `{"question": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message.
    pub question: String,

    /// Conversation the message belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// Create a request outside of any conversation.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_id: None,
        }
    }

    /// Attach the request to an existing conversation.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// JSON payload of a `data: ` frame.
///
/// Only `delta` events carry visible text. Any other `type` deserializes to
/// [`WireEvent::Other`] and is skipped by the decoder.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Delta { content: String },
    #[serde(other)]
    Other,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Human-readable message carried in `detail`.
    ///
    /// A plain string is returned verbatim. Validation failures arrive as a
    /// list of objects with a `msg` field; those messages are joined with `"; "`.
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(detail) => Some(detail.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| match item.get("msg").and_then(Value::as_str) {
                        Some(msg) => msg.to_string(),
                        None => item.to_string(),
                    })
                    .join("; "),
            ),
            other => Some(other.to_string()),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::plugins::store::Message;

/// One entry of the outbound `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Request body posted to the completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Per-request overrides. Credential headers are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestOptions {
    pub headers: Option<HashMap<String, String>>,
}

/// Streaming chunk; only `choices[0].delta.content` is read.
#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionChunk {
    #[serde(default)]
    pub(super) choices: Vec<ChatChoiceStream>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatChoiceStream {
    #[serde(default)]
    pub(super) delta: Option<ChatStreamDelta>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatStreamDelta {
    #[serde(default)]
    pub(super) content: Option<serde_json::Value>,
}

impl ChatCompletionChunk {
    /// The text delta, if the first choice carries a string `content`.
    pub(super) fn into_delta(self) -> Option<String> {
        let choice = self.choices.into_iter().next()?;
        match choice.delta?.content? {
            serde_json::Value::String(text) => Some(text),
            _ => None,
        }
    }
}

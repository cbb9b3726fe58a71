//! Chat Completions API types (`/v1/chat/completions`).
//!
//! Request shapes accept the full OpenAI surface leniently: unknown fields
//! are collected into `other` rather than rejected, and message content may
//! be a bare string or an array of typed parts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    /// ID of the model to use. May be empty (adapter default applies) or
    /// qualified as `adapterType/model`.
    #[serde(default)]
    pub model: String,

    /// Conversation so far. Absent or empty is an admission error, not a
    /// deserialization error.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Whether to stream back the response as SSE.
    #[serde(default)]
    pub stream: bool,

    /// Fields this gateway does not interpret (temperature, max_tokens, ...).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

/// Message content: a plain string or an array of typed parts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChatMessage {
    /// Concatenated text of this message (string content or text parts).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Image URLs carried by this message, in order of appearance.
    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String, // "chat.completion"
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>, // "stop"
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseMessage {
    pub role: String, // "assistant"
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionStreamChunk {
    pub id: String,
    pub object: String, // "chat.completion.chunk"
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatStreamChoice {
    pub index: u32,
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// One-choice assistant response in the shape OpenAI clients expect.
    pub fn assistant(id: impl Into<String>, model: impl Into<String>, content: String) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: model.into(),
            choices: vec![ChatChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}

impl ChatCompletionStreamChunk {
    pub fn content(id: impl Into<String>, model: impl Into<String>, content: String) -> Self {
        Self::delta(
            id,
            model,
            StreamDelta {
                role: Some("assistant".to_string()),
                content: Some(content),
            },
            None,
        )
    }

    /// Terminal chunk: empty delta, `finish_reason = "stop"`.
    pub fn done(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::delta(id, model, StreamDelta::default(), Some("stop".to_string()))
    }

    /// Heartbeat chunk for `content`-mode keepalive: empty content, no
    /// finish reason. Survives clients that strip SSE comments.
    pub fn heartbeat(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::delta(
            id,
            model,
            StreamDelta {
                role: None,
                content: Some(String::new()),
            },
            None,
        )
    }

    fn delta(
        id: impl Into<String>,
        model: impl Into<String>,
        delta: StreamDelta,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: model.into(),
            choices: vec![ChatStreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

//! OpenAI-compatible wire types for the chat-completions surface.
//!
//! These are pure serde shapes shared between the gateway's HTTP layer and
//! its tests. Engine logic lives in the gateway crate; nothing here knows
//! about workers, adapters, or scheduling.

pub mod chat;
pub mod error;
pub mod models;

pub use chat::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatCompletionStreamChunk,
    ChatMessage, ChatStreamChoice, ContentPart, ImageUrl, MessageContent, ResponseMessage,
    StreamDelta,
};
pub use error::{ErrorBody, ErrorDetail};
pub use models::{ModelEntry, ModelList};

//! Stream transport: SSE framing with keepalive, and the non-streaming
//! response shape.

pub mod response;
pub mod sse;

pub use response::{chat_completion_id, render_content};
pub use sse::{SseChannel, HEARTBEAT_INTERVAL};

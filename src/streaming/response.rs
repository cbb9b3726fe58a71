//! Non-streaming response assembly.

use openai_wire::ChatCompletionResponse;

use crate::{
    adapters::GenerateOutput,
    core::error::{ErrorCode, GatewayError},
};

/// Synthetic completion id: `chatcmpl-<milliseconds>`.
pub fn chat_completion_id() -> String {
    format!("chatcmpl-{}", chrono::Utc::now().timestamp_millis())
}

/// Render a generation result into OpenAI message content: plain text, a
/// Markdown image embed, or both concatenated. Text may already carry media
/// data URIs (video outputs) and is passed through verbatim.
pub fn render_content(output: &GenerateOutput) -> Result<String, GatewayError> {
    let embed = output
        .image
        .as_ref()
        .map(|img| format!("![generated](data:{};base64,{})", img.mime, img.base64));

    match (&output.text, embed) {
        (Some(text), Some(embed)) => Ok(format!("{text}\n\n{embed}")),
        (Some(text), None) => Ok(text.clone()),
        (None, Some(embed)) => Ok(embed),
        (None, None) => Err(GatewayError::new(
            ErrorCode::GenerationFailed,
            "upstream produced no response",
        )),
    }
}

/// Build the full non-streaming body for a finished task.
pub fn completion_response(
    model: &str,
    output: &GenerateOutput,
) -> Result<ChatCompletionResponse, GatewayError> {
    let content = render_content(output)?;
    Ok(ChatCompletionResponse::assistant(
        chat_completion_id(),
        model,
        content,
    ))
}

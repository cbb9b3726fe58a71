//! Request admission.
//!
//! Turns a parsed OpenAI request into a queued task, applying the admission
//! rules in order: message shape, image limit, model resolution, candidate
//! image policy, capacity. Streaming requests are always admitted once they
//! pass validation (the keepalive makes queue-waiting safe for the client);
//! non-streaming requests bounce off a full queue with SERVER_BUSY.

use std::path::PathBuf;

use base64::Engine;
use openai_wire::ChatCompletionRequest;
use tracing::debug;

use crate::{
    adapters::ImagePolicy,
    core::{
        error::{ErrorCode, GatewayError},
        task::Task,
    },
    server::state::AppState,
};

/// Extension of a decoded image attachment, by MIME subtype. The upload
/// helper accepts these four formats.
fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Validate a request and build its task. Image payloads are decoded to
/// `data/temp/` only after every rejection rule has passed.
pub fn admit(state: &AppState, request: ChatCompletionRequest) -> Result<Task, GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::new(
            ErrorCode::NoMessages,
            "messages is required and cannot be empty",
        ));
    }

    let user_messages: Vec<_> = request
        .messages
        .iter()
        .filter(|m| m.role == "user")
        .collect();
    if user_messages.is_empty() {
        return Err(GatewayError::new(
            ErrorCode::NoUserMessages,
            "at least one user message is required",
        ));
    }

    // Prompt: the last user message's text. Images: every user message's
    // attachments, concatenated in order.
    let prompt = user_messages
        .last()
        .map(|m| m.text())
        .unwrap_or_default();
    let image_urls: Vec<&str> = user_messages
        .iter()
        .flat_map(|m| m.image_urls())
        .collect();

    let limit = state.config.queue.image_limit;
    if image_urls.len() > limit {
        return Err(GatewayError::new(
            ErrorCode::TooManyImages,
            format!("request carries {} images, limit is {limit}", image_urls.len()),
        ));
    }

    if !state.pool.any_initialized() {
        return Err(GatewayError::new(
            ErrorCode::BrowserNotInitialized,
            "no worker is initialized yet",
        ));
    }

    let has_images = !image_urls.is_empty();
    let task = Task::new(
        request.model.clone(),
        prompt,
        Vec::new(),
        request.stream,
        request.other.clone(),
    );

    let candidates = state.pool.candidates(&task.model_key, has_images)?;

    // Candidate-set image policy: reject only when every candidate agrees.
    let policies: Vec<Option<ImagePolicy>> = candidates
        .iter()
        .map(|w| w.image_policy(&task.model_key))
        .collect();
    if has_images
        && policies
            .iter()
            .all(|p| matches!(p, Some(ImagePolicy::Forbidden) | None))
    {
        return Err(GatewayError::new(
            ErrorCode::ImageForbidden,
            format!("model '{}' does not accept images", task.model_key),
        ));
    }
    if !has_images
        && policies
            .iter()
            .all(|p| matches!(p, Some(ImagePolicy::Required)))
    {
        return Err(GatewayError::new(
            ErrorCode::ImageRequired,
            format!("model '{}' requires at least one image", task.model_key),
        ));
    }

    // Capacity gate, non-streaming only.
    if !task.streaming {
        let in_flight = state.pool.total_busy() + state.queue.len();
        let capacity = state.pool.max_concurrent() + state.config.queue.queue_buffer;
        if in_flight >= capacity {
            return Err(GatewayError::new(
                ErrorCode::ServerBusy,
                "server is at capacity, retry later",
            ));
        }
    }

    let image_paths = decode_images(&image_urls, &state.temp_dir)?;
    debug!(
        model = %task.model_key,
        streaming = task.streaming,
        images = image_paths.len(),
        "Request admitted"
    );
    Ok(Task { image_paths, ..task })
}

/// Decode `data:<mime>;base64,<body>` payloads into temp files the adapter
/// can upload by path.
fn decode_images(urls: &[&str], temp_dir: &std::path::Path) -> Result<Vec<PathBuf>, GatewayError> {
    let mut paths = Vec::with_capacity(urls.len());
    for url in urls {
        let (mime, body) = parse_data_url(url).ok_or_else(|| {
            GatewayError::internal("image_url must be a base64 data URI")
        })?;
        let ext = extension_for(&mime).ok_or_else(|| {
            GatewayError::internal(format!("unsupported image type '{mime}'"))
        })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|_| GatewayError::internal("invalid base64 image payload"))?;

        let path = temp_dir.join(format!("upload-{}.{ext}", uuid::Uuid::new_v4()));
        std::fs::write(&path, bytes)
            .map_err(|e| GatewayError::internal(format!("failed to stage image: {e}")))?;
        paths.push(path);
    }
    Ok(paths)
}

fn parse_data_url(url: &str) -> Option<(String, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, body) = rest.split_once(";base64,")?;
    Some((mime.to_ascii_lowercase(), body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_url() {
        let (mime, body) = parse_data_url("data:image/png;base64,AAAA").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(body, "AAAA");
        assert!(parse_data_url("https://example.test/cat.png").is_none());
        assert!(parse_data_url("data:image/png,AAAA").is_none());
    }

    #[test]
    fn extension_mapping_covers_upload_formats() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/gif"), Some("gif"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("image/tiff"), None);
    }

    #[test]
    fn decodes_images_to_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"fake-png");
        let url = format!("data:image/png;base64,{payload}");
        let paths = decode_images(&[url.as_str()], dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"fake-png");
    }
}

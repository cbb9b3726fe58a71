//! Gateway error taxonomy.
//!
//! Every failure that reaches a client is expressed as a [`GatewayError`]
//! with a stable code. Adapter-raised errors arrive as strings (the adapter
//! contract defines the vocabulary) and are classified by [`normalize_error`]
//! into a code plus a retryability verdict the failover executor acts on.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openai_wire::ErrorBody;
use thiserror::Error;

pub const HEADER_X_WMG_ERROR_CODE: &str = "X-WMG-Error-Code";

/// Stable error codes with their HTTP status and OpenAI error-type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unauthorized,
    BrowserNotInitialized,
    ServerBusy,
    NoMessages,
    NoUserMessages,
    TooManyImages,
    InvalidModel,
    ImageRequired,
    ImageForbidden,
    Recaptcha,
    InternalError,
    GenerationFailed,
    FailoverExhausted,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::BrowserNotInitialized => "BROWSER_NOT_INITIALIZED",
            ErrorCode::ServerBusy => "SERVER_BUSY",
            ErrorCode::NoMessages => "NO_MESSAGES",
            ErrorCode::NoUserMessages => "NO_USER_MESSAGES",
            ErrorCode::TooManyImages => "TOO_MANY_IMAGES",
            ErrorCode::InvalidModel => "INVALID_MODEL",
            ErrorCode::ImageRequired => "IMAGE_REQUIRED",
            ErrorCode::ImageForbidden => "IMAGE_FORBIDDEN",
            ErrorCode::Recaptcha => "RECAPTCHA",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::FailoverExhausted => "FAILOVER_EXHAUSTED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::BrowserNotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ServerBusy => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::NoMessages
            | ErrorCode::NoUserMessages
            | ErrorCode::TooManyImages
            | ErrorCode::InvalidModel
            | ErrorCode::ImageRequired
            | ErrorCode::ImageForbidden => StatusCode::BAD_REQUEST,
            ErrorCode::Recaptcha => StatusCode::FORBIDDEN,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::GenerationFailed | ErrorCode::FailoverExhausted => StatusCode::BAD_GATEWAY,
        }
    }

    /// OpenAI `error.type` string for this code.
    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized
            | ErrorCode::NoMessages
            | ErrorCode::NoUserMessages
            | ErrorCode::TooManyImages
            | ErrorCode::InvalidModel
            | ErrorCode::ImageRequired
            | ErrorCode::ImageForbidden => "invalid_request",
            ErrorCode::ServerBusy => "rate_limit",
            ErrorCode::BrowserNotInitialized
            | ErrorCode::Recaptcha
            | ErrorCode::InternalError
            | ErrorCode::GenerationFailed
            | ErrorCode::FailoverExhausted => "server_error",
        }
    }

    /// Whether the failover executor may try another candidate after this
    /// failure, counting it against the retry budget. Non-retryable results
    /// still advance to the next candidate but do not consume budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            // A different adapter may be warm, logged in, or past the wall.
            ErrorCode::Recaptcha
            | ErrorCode::GenerationFailed
            | ErrorCode::BrowserNotInitialized => true,
            ErrorCode::Unauthorized
            | ErrorCode::ServerBusy
            | ErrorCode::NoMessages
            | ErrorCode::NoUserMessages
            | ErrorCode::TooManyImages
            | ErrorCode::InvalidModel
            | ErrorCode::ImageRequired
            | ErrorCode::ImageForbidden
            | ErrorCode::InternalError
            | ErrorCode::FailoverExhausted => false,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error carrying a taxonomy code and a client-safe message.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "invalid or missing bearer token")
    }

    pub fn invalid_model(model: &str) -> Self {
        Self::new(
            ErrorCode::InvalidModel,
            format!("no worker supports model '{model}'"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Wrap the last failover cause, keeping it visible in the message.
    pub fn failover_exhausted(last: &GatewayError) -> Self {
        Self::new(
            ErrorCode::FailoverExhausted,
            format!("all candidates failed, last error: {last}"),
        )
    }

    /// Whether the failover executor counts this error against its budget.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(
            self.message.clone(),
            self.code.error_type(),
            self.code.as_str(),
        )
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::with_capacity(1);
        if let Ok(val) = HeaderValue::from_str(self.code.as_str()) {
            headers.insert(HEADER_X_WMG_ERROR_CODE, val);
        }
        (self.code.status(), headers, Json(self.body())).into_response()
    }
}

// ============================================================================
// Adapter error-string classification
// ============================================================================

/// Error strings adapters must surface for page-level failures.
pub const PAGE_CLOSED: &str = "PAGE_CLOSED";
pub const PAGE_CRASHED: &str = "PAGE_CRASHED";
pub const PAGE_INVALID: &str = "PAGE_INVALID";
pub const RECAPTCHA_FAILED: &str = "recaptcha validation failed";

/// Classify an adapter-raised error string into a taxonomy code plus a
/// retryability verdict.
///
/// Recognized vocabulary (per the adapter contract): the captcha sentinel,
/// strings containing `Timeout`, the `PAGE_*` invalidation markers, and
/// upstream `HTTP <code>` statuses. Anything else is an internal error and
/// does not retry.
pub fn normalize_error(raw: &str) -> GatewayError {
    if raw.contains(RECAPTCHA_FAILED) {
        return GatewayError::new(ErrorCode::Recaptcha, RECAPTCHA_FAILED);
    }
    if raw.contains("Timeout") {
        return GatewayError::new(ErrorCode::GenerationFailed, raw);
    }
    if raw.contains(PAGE_CLOSED) || raw.contains(PAGE_CRASHED) || raw.contains(PAGE_INVALID) {
        return GatewayError::new(ErrorCode::GenerationFailed, raw);
    }
    if let Some(rest) = raw.split("HTTP ").nth(1) {
        if rest
            .chars()
            .take_while(|c| !c.is_whitespace())
            .all(|c| c.is_ascii_digit())
            && !rest.is_empty()
        {
            return GatewayError::new(ErrorCode::GenerationFailed, raw);
        }
    }
    GatewayError::new(ErrorCode::InternalError, raw)
}

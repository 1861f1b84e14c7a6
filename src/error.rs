//! Error types for the triage router
//!
//! Maps internal failures to HTTP status codes and to sanitized messages that
//! are safe to return to chat clients.

use crate::llm::provider::LlmError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use warp::http::StatusCode;

/// Main error type for routing a chat turn
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Stream interrupted: {message}")]
    StreamInterrupted { message: String },

    #[error("LLM provider error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Client-facing error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub timestamp: String,
}

impl RouterError {
    /// HTTP status used when this error is surfaced before streaming starts
    pub fn status_code(&self) -> StatusCode {
        match self {
            RouterError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            RouterError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::StreamInterrupted { .. } => StatusCode::BAD_GATEWAY,
            RouterError::LlmError(_) => StatusCode::BAD_GATEWAY,
            RouterError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            RouterError::ConfigError(_) | RouterError::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::InvalidInput { .. } => "invalid_input",
            RouterError::ServiceUnavailable { .. } => "service_unavailable",
            RouterError::StreamInterrupted { .. } => "stream_interrupted",
            RouterError::LlmError(_) => "llm_error",
            RouterError::SessionNotFound { .. } => "session_not_found",
            RouterError::ConfigError(_) => "config_error",
            RouterError::InternalError { .. } => "internal_error",
        }
    }

    /// Build the sanitized body returned to HTTP clients
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: sanitize_error_message(&self.to_string()),
            code: self.code(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether the caller may reasonably retry the same turn
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::ServiceUnavailable { .. }
                | RouterError::StreamInterrupted { .. }
                | RouterError::LlmError(_)
        )
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create service unavailable error
    pub fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Create stream interrupted error
    pub fn stream_interrupted<S: Into<String>>(message: S) -> Self {
        Self::StreamInterrupted {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.azure|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_CLIENT_MESSAGE_LEN: usize = 500;

/// Sanitize error messages before they leave the process
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_CLIENT_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_CLIENT_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

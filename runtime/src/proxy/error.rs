use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::provider::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Caller sent missing or malformed fields; no upstream call was made.
    #[error("{message}")]
    InvalidInput { code: &'static str, message: String },

    #[error("{0} not configured")]
    Unconfigured(&'static str),

    #[error("{message} ({status}): {}", upstream_reason(.details))]
    Upstream {
        status: u16,
        message: &'static str,
        details: Value,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProxyError {
    pub fn missing_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: "missing_input",
            message: message.into(),
        }
    }

    pub fn missing_schema() -> Self {
        Self::InvalidInput {
            code: "missing_schema",
            message: "Schema is required".to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: "invalid_input",
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidInput { .. } => "invalid_input",
            ProxyError::Unconfigured(_) => "unconfigured",
            ProxyError::Upstream { .. } => "upstream_error",
            ProxyError::Transport(_) => "transport",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::InvalidInput { code, .. } => code,
            other => other.kind(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ProxyError::Unconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> Value {
        match self {
            ProxyError::Upstream {
                message, details, ..
            } => json!({ "error": message, "details": details }),
            ProxyError::Transport(err) => json!({ "error": err.to_string(), "details": null }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Digs the most specific human-readable message out of a provider error body.
pub fn upstream_reason(details: &Value) -> String {
    match details {
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            let nested = map.get("error").and_then(|error| match error {
                Value::String(text) => Some(text.clone()),
                Value::Object(inner) => inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            });
            nested
                .or_else(|| map.get("message").and_then(Value::as_str).map(str::to_string))
                .or_else(|| map.get("detail").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| details.to_string())
        }
        Value::Null => "no response body".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_uses_deepest_reason() {
        let err = ProxyError::Upstream {
            status: 502,
            message: "Failed to parse document",
            details: json!({ "error": "rate limited" }),
        };
        assert_eq!(err.to_string(), "Failed to parse document (502): rate limited");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.kind(), "upstream_error");
    }

    #[test]
    fn nested_error_objects_are_unwrapped() {
        assert_eq!(
            upstream_reason(&json!({ "error": { "message": "quota exceeded" } })),
            "quota exceeded"
        );
        assert_eq!(upstream_reason(&json!({ "detail": "bad pdf" })), "bad pdf");
        assert_eq!(upstream_reason(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let err = ProxyError::missing_schema();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "missing_schema");
        assert_eq!(err.body(), json!({ "error": "Schema is required" }));
    }
}

pub mod chat;
pub mod models;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use conduit::context::ContextError;
use conduit::errors::{ErrorType, RuntimeError};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(models::routes(state))
}

/// Error body shared by every route: `{ errorType, body: { error, provider } }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_type: ErrorType,
    error: Value,
    provider: String,
}

impl ApiError {
    fn new(error_type: ErrorType, error: Value, provider: &str) -> Self {
        Self {
            status: StatusCode::from_u16(error_type.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error_type,
            error,
            provider: provider.to_string(),
        }
    }

    pub fn unknown_provider(provider: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            ..Self::new(
                ErrorType::AgentRuntimeError,
                json!({ "message": format!("no runtime is configured for {provider}") }),
                provider,
            )
        }
    }

    pub fn bad_request(provider: &str, message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            ..Self::new(
                ErrorType::AgentRuntimeError,
                json!({ "message": message }),
                provider,
            )
        }
    }

    pub fn runtime(err: RuntimeError, provider: &str) -> Self {
        tracing::error!(provider, error = %err, "request failed");
        let error_type = err.error_type();
        let error = match err {
            RuntimeError::Provider(error) => error
                .body
                .unwrap_or_else(|| json!({ "message": error.message })),
            other => json!({ "message": other.to_string() }),
        };
        Self::new(error_type, error, provider)
    }

    pub fn context(err: ContextError, provider: &str) -> Self {
        tracing::error!(provider, error = %err, "context assembly failed");
        Self::new(
            ErrorType::AgentRuntimeError,
            json!({ "message": err.to_string() }),
            provider,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "errorType": self.error_type,
            "body": {
                "error": self.error,
                "provider": self.provider,
            },
        });
        (self.status, Json(body)).into_response()
    }
}

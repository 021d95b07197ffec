use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Classification carried by every failure that leaves a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum ErrorType {
    #[strum(serialize = "InvalidProviderAPIKey")]
    #[serde(rename = "InvalidProviderAPIKey")]
    InvalidProviderApiKey,
    QuotaLimitReached,
    PermissionDenied,
    ModelNotFound,
    ExceededContextWindow,
    ProviderBizError,
    StreamChunkError,
    AgentRuntimeError,
    InternalServerError,
}

impl ErrorType {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorType::InvalidProviderApiKey,
            403 => ErrorType::PermissionDenied,
            404 => ErrorType::ModelNotFound,
            429 => ErrorType::QuotaLimitReached,
            _ => ErrorType::ProviderBizError,
        }
    }

    /// HTTP status a server should answer with for this error class.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorType::InvalidProviderApiKey => 401,
            ErrorType::PermissionDenied => 403,
            ErrorType::ModelNotFound => 404,
            ErrorType::QuotaLimitReached => 429,
            ErrorType::ExceededContextWindow => 400,
            ErrorType::InternalServerError | ErrorType::AgentRuntimeError => 500,
            ErrorType::ProviderBizError | ErrorType::StreamChunkError => 471,
        }
    }
}

/// A failure reported by (or on behalf of) an upstream backend.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{error_type} from {provider}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionError {
    pub error_type: ErrorType,
    pub provider: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ChatCompletionError {
    pub fn new<P: Into<String>, M: Into<String>>(
        error_type: ErrorType,
        provider: P,
        message: M,
    ) -> Self {
        Self {
            error_type,
            provider: provider.into(),
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend does not support {capability}")]
    Unsupported { capability: &'static str },

    #[error(transparent)]
    Provider(#[from] ChatCompletionError),

    #[error("Model list resolution failed for {registration}: {message}")]
    ModelResolution {
        registration: String,
        message: String,
    },

    #[error("Request cancelled")]
    Cancelled,
}

impl RuntimeError {
    pub fn unsupported(capability: &'static str) -> Self {
        RuntimeError::Unsupported { capability }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            RuntimeError::Provider(err) => err.error_type,
            RuntimeError::Configuration(_) | RuntimeError::Unsupported { .. } => {
                ErrorType::AgentRuntimeError
            }
            RuntimeError::ModelResolution { .. } => ErrorType::ProviderBizError,
            RuntimeError::Cancelled => ErrorType::AgentRuntimeError,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            RuntimeError::Provider(err) => Some(&err.provider),
            _ => None,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

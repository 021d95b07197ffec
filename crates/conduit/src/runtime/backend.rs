use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::errors::{RuntimeError, RuntimeResult};
use crate::model_bank::ModelCard;
use crate::models::message::WireMessage;
use crate::models::tool::Tool;
use crate::streams::{EventStream, StreamCallbacks};

fn default_stream() -> bool {
    true
}

/// A chat request as handed to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl ChatPayload {
    pub fn new<S: Into<String>>(model: S, messages: Vec<WireMessage>) -> Self {
        ChatPayload {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: true,
        }
    }
}

/// Per-request settings of a chat call
#[derive(Clone, Default)]
pub struct ChatOptions {
    pub callbacks: Option<Arc<dyn StreamCallbacks>>,
    /// Cancelling stops the upstream request and every stream stage
    pub cancel: CancellationToken,
    /// End user identifier forwarded to backends that accept one
    pub user: Option<String>,
}

impl std::fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOptions")
            .field("callbacks", &self.callbacks.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToImagePayload {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingsPayload {
    pub model: String,
    pub input: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsOptions {
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToSpeechPayload {
    pub model: String,
    pub input: String,
    pub voice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextToSpeechOptions {
    #[serde(default)]
    pub user: Option<String>,
}

/// Options a backend is constructed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendOptions {
    /// Identity of the runtime the backend serves
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl BackendOptions {
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// `overrides` wins key by key; `id` is always the runtime id
    pub fn merged(&self, overrides: &BackendOptions, id: &str) -> BackendOptions {
        let mut extra = self.extra.clone();
        extra.extend(overrides.extra.clone());
        BackendOptions {
            id: id.to_string(),
            api_key: overrides.api_key.clone().or_else(|| self.api_key.clone()),
            base_url: overrides.base_url.clone().or_else(|| self.base_url.clone()),
            extra,
        }
    }
}

/// The capability surface every backend presents to the router.
///
/// A backend overrides what its vendor supports; everything else fails with
/// [`RuntimeError::Unsupported`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn chat(&self, _payload: ChatPayload, _options: ChatOptions) -> RuntimeResult<EventStream> {
        Err(RuntimeError::unsupported("chat"))
    }

    async fn text_to_image(&self, _payload: TextToImagePayload) -> RuntimeResult<Vec<String>> {
        Err(RuntimeError::unsupported("textToImage"))
    }

    async fn embeddings(
        &self,
        _payload: EmbeddingsPayload,
        _options: EmbeddingsOptions,
    ) -> RuntimeResult<Vec<Vec<f32>>> {
        Err(RuntimeError::unsupported("embeddings"))
    }

    async fn text_to_speech(
        &self,
        _payload: TextToSpeechPayload,
        _options: TextToSpeechOptions,
    ) -> RuntimeResult<Bytes> {
        Err(RuntimeError::unsupported("textToSpeech"))
    }

    async fn models(&self) -> RuntimeResult<Vec<ModelCard>> {
        Err(RuntimeError::unsupported("models"))
    }
}

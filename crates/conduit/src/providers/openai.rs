use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::utils::{http_client, join_url, send, sse_chunks, transport_error};
use crate::errors::{ChatCompletionError, ErrorType, RuntimeError, RuntimeResult};
use crate::model_bank::{process_model_list, ModelCard};
use crate::models::tool::Tool;
use crate::runtime::{
    Backend, BackendOptions, ChatOptions, ChatPayload, EmbeddingsOptions, EmbeddingsPayload,
    TextToImagePayload, TextToSpeechOptions, TextToSpeechPayload,
};
use crate::streams::openai::{ChatCompletionChunk, ChoiceDelta, ChunkChoice, CompletionUsage};
use crate::streams::{openai_stream, EventStream, StreamOptions};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";

/// Backend for OpenAI and every server speaking its HTTP api
pub struct OpenAiBackend {
    client: Client,
    options: BackendOptions,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    message: ChoiceDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ModelObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingObject {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

/// A complete response as the single chunk a stream would have delivered
fn completion_to_chunk(completion: ChatCompletion) -> ChatCompletionChunk {
    let choices = completion
        .choices
        .into_iter()
        .map(|choice| {
            let mut delta = choice.message;
            // Whole messages do not number their tool calls
            for (index, call) in delta.tool_calls.iter_mut().enumerate() {
                call.index = index as u32;
            }
            ChunkChoice {
                index: choice.index,
                delta,
                finish_reason: choice.finish_reason.or_else(|| Some("stop".to_string())),
            }
        })
        .collect();

    ChatCompletionChunk {
        id: completion.id,
        choices,
        usage: completion.usage,
        ..Default::default()
    }
}

pub fn tools_to_openai_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

impl OpenAiBackend {
    pub fn new(options: BackendOptions) -> RuntimeResult<Self> {
        let base_url = options
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        Ok(Self {
            client: http_client()?,
            options,
            base_url,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, join_url(&self.base_url, path));
        match &self.options.api_key {
            Some(api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }

    fn chat_body(&self, payload: &ChatPayload, user: Option<&str>) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(payload.model));
        body.insert("messages".to_string(), json!(payload.messages));
        body.insert("stream".to_string(), json!(payload.stream));
        if !payload.tools.is_empty() {
            body.insert("tools".to_string(), json!(tools_to_openai_spec(&payload.tools)));
        }
        if let Some(temperature) = payload.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = payload.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if let Some(top_p) = payload.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
        if payload.stream {
            body.insert("stream_options".to_string(), json!({ "include_usage": true }));
        }
        if let Some(user) = user {
            body.insert("user".to_string(), json!(user));
        }
        Value::Object(body)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: Value,
    ) -> RuntimeResult<T> {
        let request = self.request(reqwest::Method::POST, path).json(&body);
        let response = send(PROVIDER, request, &CancellationToken::new()).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| transport_error(PROVIDER, err))
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn chat(&self, payload: ChatPayload, options: ChatOptions) -> RuntimeResult<EventStream> {
        let input_start_at = Instant::now();
        let body = self.chat_body(&payload, options.user.as_deref());
        let request = self
            .request(reqwest::Method::POST, "chat/completions")
            .json(&body);
        let response = send(PROVIDER, request, &options.cancel).await?;

        let stream_options = StreamOptions {
            callbacks: options.callbacks,
            cancel: options.cancel,
            input_start_at: Some(input_start_at),
            enable_streaming: payload.stream,
            require_terminal_event: true,
        };

        if payload.stream {
            let chunks = sse_chunks(response, PROVIDER, ChatCompletionChunk::runtime_error);
            return Ok(openai_stream(chunks, stream_options));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let chunks = futures::stream::iter(vec![completion_to_chunk(completion)]);
        Ok(openai_stream(chunks, stream_options))
    }

    async fn text_to_image(&self, payload: TextToImagePayload) -> RuntimeResult<Vec<String>> {
        let mut body = json!({
            "model": payload.model,
            "prompt": payload.prompt,
            "n": payload.n.unwrap_or(1),
        });
        if let Some(size) = &payload.size {
            body["size"] = json!(size);
        }
        if let Some(quality) = &payload.quality {
            body["quality"] = json!(quality);
        }

        let images: ListResponse<ImageObject> = self.post_json("images/generations", body).await?;
        images
            .data
            .into_iter()
            .map(|image| match (image.url, image.b64_json) {
                (Some(url), _) => Ok(url),
                (None, Some(b64)) => Ok(format!("data:image/png;base64,{b64}")),
                (None, None) => Err(RuntimeError::Provider(ChatCompletionError::new(
                    ErrorType::ProviderBizError,
                    PROVIDER,
                    "image generation returned neither url nor data",
                ))),
            })
            .collect()
    }

    async fn embeddings(
        &self,
        payload: EmbeddingsPayload,
        options: EmbeddingsOptions,
    ) -> RuntimeResult<Vec<Vec<f32>>> {
        let mut body = json!({
            "model": payload.model,
            "input": payload.input,
            "encoding_format": "float",
        });
        if let Some(dimensions) = payload.dimensions {
            body["dimensions"] = json!(dimensions);
        }
        if let Some(user) = options.user {
            body["user"] = json!(user);
        }

        let mut embeddings: ListResponse<EmbeddingObject> =
            self.post_json("embeddings", body).await?;
        embeddings.data.sort_by_key(|embedding| embedding.index);
        Ok(embeddings
            .data
            .into_iter()
            .map(|embedding| embedding.embedding)
            .collect())
    }

    async fn text_to_speech(
        &self,
        payload: TextToSpeechPayload,
        options: TextToSpeechOptions,
    ) -> RuntimeResult<Bytes> {
        let mut body = json!({
            "model": payload.model,
            "input": payload.input,
            "voice": payload.voice,
        });
        if let Some(format) = &payload.response_format {
            body["response_format"] = json!(format);
        }
        if let Some(speed) = payload.speed {
            body["speed"] = json!(speed);
        }
        if let Some(user) = options.user {
            body["user"] = json!(user);
        }

        let request = self.request(reqwest::Method::POST, "audio/speech").json(&body);
        let response = send(PROVIDER, request, &CancellationToken::new()).await?;
        response
            .bytes()
            .await
            .map_err(|err| transport_error(PROVIDER, err))
    }

    async fn models(&self) -> RuntimeResult<Vec<ModelCard>> {
        let request = self.request(reqwest::Method::GET, "models");
        let response = send(PROVIDER, request, &CancellationToken::new()).await?;
        let models: ListResponse<ModelObject> = response
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let ids: Vec<String> = models.data.into_iter().map(|model| model.id).collect();
        Ok(process_model_list(&ids, Some(PROVIDER)))
    }
}

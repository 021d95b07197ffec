use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::utils::{http_client, join_url, send, sse_chunks, transport_error};
use crate::errors::RuntimeResult;
use crate::image::{parse_data_uri, UriKind, DEFAULT_IMAGE_MIME};
use crate::model_bank::{process_model_list, ModelCard};
use crate::models::content::{ContentPart, MessageContent};
use crate::models::message::{Role, WireMessage};
use crate::models::tool::Tool;
use crate::runtime::{
    Backend, BackendOptions, ChatOptions, ChatPayload, EmbeddingsOptions, EmbeddingsPayload,
};
use crate::streams::google::{
    Blob, Content, FileData, FunctionCall, FunctionResponse, GenerateContentResponse, Part,
};
use crate::streams::{google_stream, EventStream, StreamOptions};

pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "google";

/// Backend for the Gemini api
pub struct GoogleBackend {
    client: Client,
    options: BackendOptions,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<GoogleModel>,
}

#[derive(Debug, Deserialize)]
struct GoogleModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

fn text_part<S: Into<String>>(text: S) -> Part {
    Part {
        text: Some(text.into()),
        ..Default::default()
    }
}

fn mime_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    match path.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// An image part: inline data for data uris, a file reference otherwise
fn image_part(url: &str) -> Option<Part> {
    match parse_data_uri(url).ok()? {
        UriKind::Data {
            mime_type,
            base64,
            payload,
        } => {
            let data = if base64 {
                payload.to_string()
            } else {
                let decoded = urlencoding::decode(payload).ok()?;
                STANDARD.encode(decoded.as_bytes())
            };
            Some(Part {
                inline_data: Some(Blob {
                    mime_type: mime_type.to_string(),
                    data,
                }),
                ..Default::default()
            })
        }
        UriKind::Url => Some(Part {
            file_data: Some(FileData {
                mime_type: mime_from_url(url).to_string(),
                file_uri: url.to_string(),
            }),
            ..Default::default()
        }),
    }
}

fn content_parts(content: &MessageContent) -> Vec<Part> {
    match content {
        MessageContent::Text(text) if text.is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![text_part(text.clone())],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text_part(text.clone())),
                ContentPart::ImageUrl { image_url } => image_part(&image_url.url),
                // Gemini produces its own thoughts and takes none back
                ContentPart::Thinking { .. } => None,
            })
            .collect(),
    }
}

/// Split wire messages into a system instruction and Gemini contents
pub fn messages_to_google_spec(messages: &[WireMessage]) -> (Option<Content>, Vec<Content>) {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for message in messages {
        match message.role {
            Role::System => {
                let text = message.content.to_text();
                if !text.is_empty() {
                    system.push(text);
                }
            }
            Role::User => contents.push(Content {
                role: Some("user".to_string()),
                parts: content_parts(&message.content),
            }),
            Role::Assistant => {
                let mut parts = content_parts(&message.content);
                for call in &message.tool_calls {
                    call_names.insert(&call.id, &call.function.name);
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            name: call.function.name.clone(),
                            args: serde_json::from_str(&call.function.arguments)
                                .unwrap_or_else(|_| json!({})),
                        }),
                        ..Default::default()
                    });
                }
                if !parts.is_empty() {
                    contents.push(Content {
                        role: Some("model".to_string()),
                        parts,
                    });
                }
            }
            Role::Tool => {
                let name = message
                    .name
                    .as_deref()
                    .or_else(|| {
                        message
                            .tool_call_id
                            .as_deref()
                            .and_then(|id| call_names.get(id).copied())
                    })
                    .unwrap_or("unknown_tool");
                contents.push(Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        function_response: Some(FunctionResponse {
                            name: name.to_string(),
                            response: json!({ "result": message.content.to_text() }),
                        }),
                        ..Default::default()
                    }],
                });
            }
        }
    }

    let system_instruction = (!system.is_empty()).then(|| Content {
        role: None,
        parts: vec![text_part(system.join("\n\n"))],
    });
    (system_instruction, contents)
}

pub fn tools_to_google_spec(tools: &[Tool]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect();
    json!([{ "functionDeclarations": declarations }])
}

impl GoogleBackend {
    pub fn new(options: BackendOptions) -> RuntimeResult<Self> {
        let base_url = options
            .base_url
            .clone()
            .unwrap_or_else(|| GOOGLE_BASE_URL.to_string());
        Ok(Self {
            client: http_client()?,
            options,
            base_url,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, join_url(&self.base_url, path));
        match &self.options.api_key {
            Some(api_key) => request.header("x-goog-api-key", api_key),
            None => request,
        }
    }

    fn chat_body(&self, payload: &ChatPayload) -> Value {
        let (system_instruction, contents) = messages_to_google_spec(&payload.messages);
        let mut body = Map::new();
        body.insert("contents".to_string(), json!(contents));
        if let Some(system_instruction) = system_instruction {
            body.insert("systemInstruction".to_string(), json!(system_instruction));
        }
        if !payload.tools.is_empty() {
            body.insert("tools".to_string(), tools_to_google_spec(&payload.tools));
        }

        let mut config = Map::new();
        if let Some(temperature) = payload.temperature {
            config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = payload.max_tokens {
            config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if let Some(top_p) = payload.top_p {
            config.insert("topP".to_string(), json!(top_p));
        }
        if !config.is_empty() {
            body.insert("generationConfig".to_string(), Value::Object(config));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl Backend for GoogleBackend {
    async fn chat(&self, payload: ChatPayload, options: ChatOptions) -> RuntimeResult<EventStream> {
        let input_start_at = Instant::now();
        let path = if payload.stream {
            format!("models/{}:streamGenerateContent?alt=sse", payload.model)
        } else {
            format!("models/{}:generateContent", payload.model)
        };
        let request = self
            .request(reqwest::Method::POST, &path)
            .json(&self.chat_body(&payload));
        let response = send(PROVIDER, request, &options.cancel).await?;

        let stream_options = StreamOptions {
            callbacks: options.callbacks,
            cancel: options.cancel,
            input_start_at: Some(input_start_at),
            enable_streaming: payload.stream,
            require_terminal_event: true,
        };

        if payload.stream {
            let chunks = sse_chunks(response, PROVIDER, GenerateContentResponse::runtime_error);
            return Ok(google_stream(chunks, stream_options));
        }

        let chunk: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        Ok(google_stream(futures::stream::iter(vec![chunk]), stream_options))
    }

    async fn embeddings(
        &self,
        payload: EmbeddingsPayload,
        _options: EmbeddingsOptions,
    ) -> RuntimeResult<Vec<Vec<f32>>> {
        let model = format!("models/{}", payload.model);
        let requests: Vec<Value> = payload
            .input
            .iter()
            .map(|text| {
                let mut request = json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                });
                if let Some(dimensions) = payload.dimensions {
                    request["outputDimensionality"] = json!(dimensions);
                }
                request
            })
            .collect();

        let request = self
            .request(
                reqwest::Method::POST,
                &format!("{model}:batchEmbedContents"),
            )
            .json(&json!({ "requests": requests }));
        let response = send(PROVIDER, request, &CancellationToken::new()).await?;
        let embeddings: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        Ok(embeddings
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }

    async fn models(&self) -> RuntimeResult<Vec<ModelCard>> {
        let request = self
            .request(reqwest::Method::GET, "models")
            .query(&[("pageSize", "1000")]);
        let response = send(PROVIDER, request, &CancellationToken::new()).await?;
        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let ids: Vec<String> = models
            .models
            .into_iter()
            .map(|model| {
                model
                    .name
                    .strip_prefix("models/")
                    .map(str::to_string)
                    .unwrap_or(model.name)
            })
            .collect();
        Ok(process_model_list(&ids, Some(PROVIDER)))
    }
}

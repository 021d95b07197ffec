use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ChatCompletionError, ErrorType};
use crate::models::usage::ModelTokensUsage;

/// Key of the marker a backend injects into a vendor chunk to report a failure the
/// vendor stream itself cannot carry
pub const RUNTIME_ERROR_KEY: &str = "__runtime_error";

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One canonical streaming event: `{id, type, data}` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Text(String),
    Reasoning(String),
    ToolCalls(Vec<ToolCallChunk>),
    Usage(ModelTokensUsage),
    Grounding(GroundingSearch),
    /// A complete image as a data url
    Base64Image(String),
    Speed(TokenSpeed),
    /// Finish reason reported by the backend
    Stop(String),
    Error(ErrorPayload),
}

impl EventPayload {
    /// The wire name of this event type
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::Text(_) => "text",
            EventPayload::Reasoning(_) => "reasoning",
            EventPayload::ToolCalls(_) => "tool_calls",
            EventPayload::Usage(_) => "usage",
            EventPayload::Grounding(_) => "grounding",
            EventPayload::Base64Image(_) => "base64_image",
            EventPayload::Speed(_) => "speed",
            EventPayload::Stop(_) => "stop",
            EventPayload::Error(_) => "error",
        }
    }
}

impl StreamEvent {
    pub fn new<S: Into<String>>(id: S, payload: EventPayload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, EventPayload::Stop(_) | EventPayload::Error(_))
    }

    /// The `data` member of the wire shape
    pub fn data(&self) -> Value {
        match serde_json::to_value(&self.payload) {
            Ok(Value::Object(mut object)) => object.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallChunk {
    /// Present on the first chunk of a call; later chunks only extend the arguments
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    pub id: String,
    pub index: u32,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCallChunk,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCallChunk {
    pub fn new<I: Into<String>>(
        id: I,
        index: u32,
        name: Option<String>,
        arguments: String,
    ) -> Self {
        Self {
            id: id.into(),
            index,
            kind: function_type(),
            function: FunctionCallChunk { name, arguments },
        }
    }
}

/// Stable id for a tool call whose backend assigns none
pub fn generate_tool_call_id(index: u32, name: Option<&str>) -> String {
    format!("{}_{}", name.unwrap_or("unknown_tool_call"), index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSearch {
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_queries: Option<Vec<String>>,
}

/// Output throughput of one generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSpeed {
    /// Output tokens per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
    /// Milliseconds from request start to the first output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttft: Option<f64>,
}

/// Data of an `error` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    #[serde(default)]
    pub body: Value,
}

impl ErrorPayload {
    pub fn new(error_type: ErrorType, body: Value) -> Self {
        Self { error_type, body }
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// Read an injected marker, keeping unrecognised shapes as the body of a
    /// `StreamChunkError`
    pub fn from_marker(marker: Value) -> Self {
        serde_json::from_value::<ErrorPayload>(marker.clone())
            .unwrap_or_else(|_| ErrorPayload::new(ErrorType::StreamChunkError, marker))
    }
}

impl From<&ChatCompletionError> for ErrorPayload {
    fn from(error: &ChatCompletionError) -> Self {
        let mut body = json!({
            "message": error.message,
            "provider": error.provider,
        });
        if let Some(status) = error.status {
            body["status"] = json!(status);
        }
        if let Some(upstream) = &error.body {
            body["error"] = upstream.clone();
        }
        ErrorPayload::new(error.error_type, body)
    }
}

/// Per-stream state shared by the stages of one request
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub id: String,
    /// Tool call ids by call index, for backends that send the id only once
    pub tool_call_ids: HashMap<u32, String>,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::with_id(format!("chat_{}", nanoid::nanoid!()))
    }

    pub fn with_id<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            tool_call_ids: HashMap::new(),
        }
    }

    pub fn event(&self, payload: EventPayload) -> StreamEvent {
        StreamEvent::new(self.id.clone(), payload)
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = StreamEvent::new("chat_1", EventPayload::Text("Hello".to_string()));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"id": "chat_1", "type": "text", "data": "Hello"})
        );

        let event = StreamEvent::new("chat_1", EventPayload::Stop("STOP".to_string()));
        assert!(event.is_terminal());
        assert_eq!(event.event_type(), "stop");
        assert_eq!(event.data(), json!("STOP"));
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let chunk = ToolCallChunk::new(
            generate_tool_call_id(0, Some("search")),
            0,
            Some("search".to_string()),
            "{}".to_string(),
        );
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "id": "search_0",
                "index": 0,
                "type": "function",
                "function": {"name": "search", "arguments": "{}"}
            })
        );
        assert_eq!(generate_tool_call_id(2, None), "unknown_tool_call_2");
    }

    #[test]
    fn test_error_payload_from_completion_error() {
        let error = ChatCompletionError::new(ErrorType::QuotaLimitReached, "openai", "slow down")
            .with_status(429);
        let payload = ErrorPayload::from(&error);
        assert_eq!(payload.error_type, ErrorType::QuotaLimitReached);
        assert_eq!(payload.message(), Some("slow down"));
        assert_eq!(payload.body["status"], 429);
    }

    #[test]
    fn test_error_payload_from_marker() {
        let known = ErrorPayload::from_marker(json!({
            "type": "ProviderBizError",
            "body": {"message": "upstream closed"}
        }));
        assert_eq!(known.error_type, ErrorType::ProviderBizError);

        let unknown = ErrorPayload::from_marker(json!("socket hang up"));
        assert_eq!(unknown.error_type, ErrorType::StreamChunkError);
        assert_eq!(unknown.body, json!("socket hang up"));
    }

    #[test]
    fn test_stream_ids() {
        let context = StreamContext::new();
        assert!(context.id.starts_with("chat_"));
        assert_ne!(context.id, StreamContext::new().id);
    }
}

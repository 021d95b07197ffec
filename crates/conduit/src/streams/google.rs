//! Gemini `GenerateContentResponse` chunks to canonical events.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::protocol::{
    generate_tool_call_id, Citation, ErrorPayload, EventPayload, GroundingSearch, StreamContext,
    StreamEvent, ToolCallChunk,
};
use crate::errors::ErrorType;
use crate::models::usage::{remainder, ModelTokensUsage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(
        rename = "__runtime_error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub runtime_error: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub candidates_token_count: Option<u64>,
    #[serde(default)]
    pub thoughts_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
    #[serde(default)]
    pub cached_content_token_count: Option<u64>,
    #[serde(default)]
    pub prompt_tokens_details: Option<Vec<ModalityTokenCount>>,
    #[serde(default)]
    pub candidates_tokens_details: Option<Vec<ModalityTokenCount>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityTokenCount {
    pub modality: String,
    #[serde(default)]
    pub token_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
    #[serde(default)]
    pub web_search_queries: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Value>,
}

impl GenerateContentResponse {
    /// Visible text of the first candidate, thought parts excluded
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let texts: Vec<&str> = parts
            .iter()
            .filter(|p| p.thought != Some(true))
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!texts.is_empty()).then(|| texts.concat())
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.function_call.as_ref())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A chunk carrying only the injected failure marker
    pub fn runtime_error(error: &ErrorPayload) -> Self {
        Self {
            runtime_error: serde_json::to_value(error).ok(),
            ..Default::default()
        }
    }
}

/// Human readable explanation of a prompt block reason
pub fn block_reason_message(block_reason: &str) -> String {
    match block_reason {
        "BLOCKLIST" => "Your content contains prohibited terms. Please review and modify your input and try again.".to_string(),
        "IMAGE_SAFETY" => "The generated image content was blocked for safety reasons. Please try modifying your image generation request.".to_string(),
        "LANGUAGE" => "The language you are using is not supported yet. Please try asking again in English or another supported language.".to_string(),
        "OTHER" => "The content was blocked for an unknown reason. Please try rephrasing your request.".to_string(),
        "PROHIBITED_CONTENT" => "Your request may contain prohibited content. Please adjust your request to comply with the usage guidelines.".to_string(),
        "SAFETY" => "Your content was blocked for safety policy reasons. Please try adjusting your request to avoid potentially harmful or inappropriate content.".to_string(),
        "SPII" => "Your content may contain sensitive personally identifiable information (PII). To protect privacy, please remove any sensitive information and try again.".to_string(),
        other => format!("Content blocked: {other}. Please adjust your request content and try again."),
    }
}

fn modality_tokens(details: Option<&Vec<ModalityTokenCount>>, modality: &str) -> Option<u64> {
    details?
        .iter()
        .find(|d| d.modality == modality)
        .and_then(|d| d.token_count)
}

/// Token breakdown of a finished generation.
///
/// Reported per-modality counts win; the text share otherwise falls back to the
/// candidates total minus image tokens.
pub fn convert_usage(usage: &UsageMetadata) -> ModelTokensUsage {
    let candidates_details = usage.candidates_tokens_details.as_ref();
    let reasoning = usage.thoughts_token_count;
    let candidates_total = usage
        .candidates_token_count
        .or_else(|| {
            candidates_details.map(|details| details.iter().filter_map(|d| d.token_count).sum())
        })
        .unwrap_or(0);
    let output_image = modality_tokens(candidates_details, "IMAGE").unwrap_or(0);
    let output_text = modality_tokens(candidates_details, "TEXT")
        .unwrap_or_else(|| remainder(candidates_total, output_image));

    let prompt_details = usage.prompt_tokens_details.as_ref();
    ModelTokensUsage {
        input_cached_tokens: usage.cached_content_token_count,
        input_image_tokens: modality_tokens(prompt_details, "IMAGE"),
        input_text_tokens: modality_tokens(prompt_details, "TEXT"),
        output_image_tokens: Some(output_image),
        output_reasoning_tokens: reasoning,
        output_text_tokens: Some(output_text),
        total_input_tokens: usage.prompt_token_count,
        total_output_tokens: Some(candidates_total + reasoning.unwrap_or(0)),
        total_tokens: usage.total_token_count,
        ..Default::default()
    }
}

/// Events for one chunk.
///
/// A chunk reporting both a finish reason and usage ends with `stop` then `usage`;
/// every branch appends that pair at most once so no chunk carries two stops.
/// [`terminal_guard`](super::terminal_guard) later holds the `stop` back, so on
/// the wire the order is `usage`, `speed`, then `stop`.
pub fn transform_google_chunk(
    chunk: GenerateContentResponse,
    context: &mut StreamContext,
) -> Vec<StreamEvent> {
    if let Some(marker) = &chunk.runtime_error {
        return vec![context.event(EventPayload::Error(ErrorPayload::from_marker(
            marker.clone(),
        )))];
    }

    if let Some(feedback) = &chunk.prompt_feedback {
        if let Some(block_reason) = &feedback.block_reason {
            return vec![context.event(EventPayload::Error(ErrorPayload::new(
                ErrorType::ProviderBizError,
                json!({
                    "context": { "promptFeedback": feedback },
                    "message": block_reason_message(block_reason),
                    "provider": "google",
                }),
            )))];
        }
    }

    let candidate = chunk.candidates.first();
    let finish_reason = candidate.and_then(|c| c.finish_reason.clone());
    let terminal: Vec<StreamEvent> = match (&finish_reason, &chunk.usage_metadata) {
        (Some(reason), Some(usage)) => vec![
            context.event(EventPayload::Stop(reason.clone())),
            context.event(EventPayload::Usage(convert_usage(usage))),
        ],
        _ => Vec::new(),
    };
    let text = chunk.text();

    let function_calls = chunk.function_calls();
    if !function_calls.is_empty() {
        let calls = function_calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                let index = index as u32;
                ToolCallChunk::new(
                    generate_tool_call_id(index, Some(&call.name)),
                    index,
                    Some(call.name.clone()),
                    serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string()),
                )
            })
            .collect();
        let mut events = vec![context.event(EventPayload::ToolCalls(calls))];
        events.extend(terminal);
        return events;
    }

    let Some(candidate) = candidate else {
        return vec![context.event(EventPayload::Text(text.unwrap_or_default()))];
    };
    let parts = candidate
        .content
        .as_ref()
        .map(|c| c.parts.as_slice())
        .unwrap_or_default();

    let thought = parts
        .iter()
        .filter(|p| p.thought == Some(true))
        .find_map(|p| p.text.as_deref().filter(|t| !t.is_empty()));
    if let Some(thought) = thought {
        let mut events = vec![context.event(EventPayload::Reasoning(thought.to_string()))];
        events.extend(terminal);
        return events;
    }

    if let Some(grounding) = &candidate.grounding_metadata {
        if let Some(chunks) = &grounding.grounding_chunks {
            let citations = chunks
                .iter()
                .map(|chunk| {
                    let web = chunk.web.clone().unwrap_or_default();
                    // grounding uris are redirects, so the title stands in for the favicon
                    Citation {
                        favicon: web.title.clone(),
                        title: web.title,
                        url: web.uri,
                    }
                })
                .collect();
            let mut events = vec![
                context.event(EventPayload::Text(text.unwrap_or_default())),
                context.event(EventPayload::Grounding(GroundingSearch {
                    citations,
                    search_queries: grounding.web_search_queries.clone(),
                })),
            ];
            events.extend(terminal);
            return events;
        }
    }

    if let Some(blob) = parts.first().and_then(|p| p.inline_data.as_ref()) {
        if !blob.data.is_empty() && !blob.mime_type.is_empty() {
            let image = format!("data:{};base64,{}", blob.mime_type, blob.data);
            let mut events = vec![context.event(EventPayload::Base64Image(image))];
            match (&finish_reason, terminal.is_empty()) {
                (Some(reason), true) => events.push(context.event(EventPayload::Stop(reason.clone()))),
                _ => events.extend(terminal),
            }
            return events;
        }
    }

    if let Some(reason) = finish_reason {
        let mut events = Vec::new();
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            events.push(context.event(EventPayload::Text(text)));
        }
        if terminal.is_empty() {
            events.push(context.event(EventPayload::Stop(reason)));
        } else {
            events.extend(terminal);
        }
        return events;
    }

    vec![context.event(EventPayload::Text(text.unwrap_or_default()))]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    fn transform(value: Value) -> Vec<StreamEvent> {
        transform_google_chunk(chunk(value), &mut StreamContext::with_id("chat_1"))
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[test]
    fn test_text_chunk() {
        let events = transform(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}]}}]
        }));
        assert_eq!(events, vec![StreamEvent::new("chat_1", EventPayload::Text("Hello".to_string()))]);
    }

    #[test]
    fn test_finish_with_usage() {
        let events = transform(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Bye"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 30,
                "thoughtsTokenCount": 8,
                "totalTokenCount": 50,
                "promptTokensDetails": [{"modality": "TEXT", "tokenCount": 12}]
            }
        }));

        assert_eq!(types(&events), vec!["text", "stop", "usage"]);
        match &events[2].payload {
            EventPayload::Usage(usage) => {
                assert_eq!(usage.input_text_tokens, Some(12));
                assert_eq!(usage.output_text_tokens, Some(30));
                assert_eq!(usage.output_image_tokens, Some(0));
                assert_eq!(usage.output_reasoning_tokens, Some(8));
                assert_eq!(usage.total_output_tokens, Some(38));
                assert_eq!(usage.total_tokens, Some(50));
            }
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_without_usage() {
        let events = transform(json!({
            "candidates": [{"content": {"parts": [{"text": ""}]}, "finishReason": "STOP"}]
        }));
        assert_eq!(events, vec![StreamEvent::new("chat_1", EventPayload::Stop("STOP".to_string()))]);
    }

    #[test]
    fn test_image_token_breakdown() {
        let usage = convert_usage(&UsageMetadata {
            candidates_token_count: Some(1300),
            candidates_tokens_details: Some(vec![ModalityTokenCount {
                modality: "IMAGE".to_string(),
                token_count: Some(1290),
            }]),
            ..Default::default()
        });
        assert_eq!(usage.output_image_tokens, Some(1290));
        assert_eq!(usage.output_text_tokens, Some(10));

        let clamped = convert_usage(&UsageMetadata {
            candidates_token_count: Some(5),
            candidates_tokens_details: Some(vec![ModalityTokenCount {
                modality: "IMAGE".to_string(),
                token_count: Some(10),
            }]),
            ..Default::default()
        });
        assert_eq!(clamped.output_text_tokens, Some(0));
    }

    #[test]
    fn test_function_calls() {
        let events = transform(json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "search____query", "args": {"q": "rust"}}},
                    {"functionCall": {"name": "calc____add", "args": {"a": 1}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 2, "totalTokenCount": 3}
        }));

        assert_eq!(types(&events), vec!["tool_calls", "stop", "usage"]);
        match &events[0].payload {
            EventPayload::ToolCalls(calls) => {
                assert_eq!(calls[0].id, "search____query_0");
                assert_eq!(calls[0].function.arguments, r#"{"q":"rust"}"#);
                assert_eq!(calls[1].id, "calc____add_1");
                assert_eq!(calls[1].index, 1);
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_thought_part_is_reasoning() {
        let events = transform(json!({
            "candidates": [{"content": {"parts": [{"text": "Let me think", "thought": true}]}}]
        }));
        assert_eq!(
            events,
            vec![StreamEvent::new("chat_1", EventPayload::Reasoning("Let me think".to_string()))]
        );
    }

    #[test]
    fn test_grounding() {
        let events = transform(json!({
            "candidates": [{
                "content": {"parts": [{"text": "It is sunny."}]},
                "groundingMetadata": {
                    "groundingChunks": [{"web": {"uri": "https://vertex/redirect/1", "title": "weather.com"}}],
                    "webSearchQueries": ["weather today"]
                }
            }]
        }));

        assert_eq!(types(&events), vec!["text", "grounding"]);
        match &events[1].payload {
            EventPayload::Grounding(grounding) => {
                assert_eq!(grounding.citations[0].favicon.as_deref(), Some("weather.com"));
                assert_eq!(
                    grounding.citations[0].url.as_deref(),
                    Some("https://vertex/redirect/1")
                );
                assert_eq!(
                    grounding.search_queries,
                    Some(vec!["weather today".to_string()])
                );
            }
            other => panic!("expected grounding, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_image_with_finish() {
        let image = json!({"inlineData": {"mimeType": "image/png", "data": "iVBOR"}});

        let with_usage = transform(json!({
            "candidates": [{"content": {"parts": [image.clone()]}, "finishReason": "STOP"}],
            "usageMetadata": {"candidatesTokenCount": 1290, "totalTokenCount": 1300}
        }));
        assert_eq!(types(&with_usage), vec!["base64_image", "stop", "usage"]);
        assert_eq!(
            with_usage[0].payload,
            EventPayload::Base64Image("data:image/png;base64,iVBOR".to_string())
        );

        let without_usage = transform(json!({
            "candidates": [{"content": {"parts": [image]}, "finishReason": "STOP"}]
        }));
        assert_eq!(types(&without_usage), vec!["base64_image", "stop"]);
    }

    #[test]
    fn test_block_reason() {
        let events = transform(json!({"promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}}));
        match &events[0].payload {
            EventPayload::Error(error) => {
                assert_eq!(error.error_type, ErrorType::ProviderBizError);
                assert_eq!(error.body["provider"], "google");
                assert!(error.message().unwrap().contains("prohibited content"));
                assert_eq!(
                    error.body["context"]["promptFeedback"]["blockReason"],
                    "PROHIBITED_CONTENT"
                );
            }
            other => panic!("expected error, got {other:?}"),
        }

        assert_eq!(
            block_reason_message("NEW_REASON"),
            "Content blocked: NEW_REASON. Please adjust your request content and try again."
        );
    }

    #[test]
    fn test_runtime_error_marker() {
        let error = ErrorPayload::new(ErrorType::StreamChunkError, json!({"message": "reset"}));
        let events = transform_google_chunk(
            GenerateContentResponse::runtime_error(&error),
            &mut StreamContext::with_id("chat_1"),
        );
        assert_eq!(events, vec![StreamEvent::new("chat_1", EventPayload::Error(error))]);
    }
}

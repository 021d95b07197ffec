//! OpenAI-compatible `chat.completion.chunk` objects to canonical events.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::protocol::{
    generate_tool_call_id, ErrorPayload, EventPayload, StreamContext, StreamEvent, ToolCallChunk,
};
use crate::errors::ErrorType;
use crate::models::usage::{remainder, ModelTokensUsage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
    /// Some compatible servers report failures in band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(
        rename = "__runtime_error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub runtime_error: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChoiceDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Alternative reasoning field used by some compatible servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: Option<u64>,
    #[serde(default)]
    pub audio_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u64>,
    #[serde(default)]
    pub audio_tokens: Option<u64>,
}

impl ChatCompletionChunk {
    pub fn runtime_error(error: &ErrorPayload) -> Self {
        Self {
            runtime_error: serde_json::to_value(error).ok(),
            ..Default::default()
        }
    }
}

pub fn convert_usage(usage: &CompletionUsage) -> ModelTokensUsage {
    let prompt = usage.prompt_tokens.unwrap_or(0);
    let completion = usage.completion_tokens.unwrap_or(0);
    let prompt_details = usage.prompt_tokens_details.clone().unwrap_or_default();
    let completion_details = usage.completion_tokens_details.clone().unwrap_or_default();

    let cached = prompt_details.cached_tokens;
    let input_audio = prompt_details.audio_tokens;
    let reasoning = completion_details.reasoning_tokens;
    let output_audio = completion_details.audio_tokens;

    ModelTokensUsage {
        input_cached_tokens: cached,
        input_audio_tokens: input_audio,
        input_text_tokens: Some(remainder(
            prompt,
            cached.unwrap_or(0) + input_audio.unwrap_or(0),
        )),
        output_reasoning_tokens: reasoning,
        output_audio_tokens: output_audio,
        output_text_tokens: Some(remainder(
            completion,
            reasoning.unwrap_or(0) + output_audio.unwrap_or(0),
        )),
        total_input_tokens: usage.prompt_tokens,
        total_output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens.or(Some(prompt + completion)),
        ..Default::default()
    }
}

fn upstream_error(error: &Value) -> ErrorPayload {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Upstream reported an error")
        .to_string();
    ErrorPayload::new(
        ErrorType::ProviderBizError,
        json!({ "error": error, "message": message, "provider": "openai" }),
    )
}

/// Events for one chunk. Tool call ids sent only on a call's first delta are
/// remembered in `context` for the rest of the call.
pub fn transform_openai_chunk(
    chunk: ChatCompletionChunk,
    context: &mut StreamContext,
) -> Vec<StreamEvent> {
    if let Some(marker) = chunk.runtime_error {
        return vec![context.event(EventPayload::Error(ErrorPayload::from_marker(marker)))];
    }
    if let Some(error) = &chunk.error {
        return vec![context.event(EventPayload::Error(upstream_error(error)))];
    }

    let usage = chunk
        .usage
        .as_ref()
        .map(|usage| context.event(EventPayload::Usage(convert_usage(usage))));

    let Some(choice) = chunk.choices.into_iter().next() else {
        return usage.into_iter().collect();
    };

    let mut events = Vec::new();
    let delta = choice.delta;

    if !delta.tool_calls.is_empty() {
        let calls = delta
            .tool_calls
            .into_iter()
            .map(|call| {
                let function = call.function.unwrap_or_default();
                let id = match call.id {
                    Some(id) => {
                        context.tool_call_ids.insert(call.index, id.clone());
                        id
                    }
                    None => context
                        .tool_call_ids
                        .entry(call.index)
                        .or_insert_with(|| {
                            generate_tool_call_id(call.index, function.name.as_deref())
                        })
                        .clone(),
                };
                ToolCallChunk::new(
                    id,
                    call.index,
                    function.name,
                    function.arguments.unwrap_or_default(),
                )
            })
            .collect();
        events.push(context.event(EventPayload::ToolCalls(calls)));
    }

    if let Some(reasoning) = delta
        .reasoning_content
        .or(delta.reasoning)
        .filter(|r| !r.is_empty())
    {
        events.push(context.event(EventPayload::Reasoning(reasoning)));
    }

    match (delta.content, &choice.finish_reason) {
        (Some(text), Some(_)) if !text.is_empty() => {
            events.push(context.event(EventPayload::Text(text)))
        }
        (Some(text), None) => events.push(context.event(EventPayload::Text(text))),
        _ => {}
    }

    if let Some(reason) = choice.finish_reason {
        events.push(context.event(EventPayload::Stop(reason)));
    }
    events.extend(usage);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform_all(chunks: Vec<Value>) -> Vec<StreamEvent> {
        let mut context = StreamContext::with_id("chat_1");
        chunks
            .into_iter()
            .flat_map(|value| {
                let chunk: ChatCompletionChunk = serde_json::from_value(value).unwrap();
                transform_openai_chunk(chunk, &mut context)
            })
            .collect()
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[test]
    fn test_text_then_finish_then_usage() {
        let events = transform_all(vec![
            json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "Hi"}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
            json!({"choices": [], "usage": {
                "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15,
                "prompt_tokens_details": {"cached_tokens": 4}
            }}),
        ]);

        assert_eq!(types(&events), vec!["text", "text", "stop", "usage"]);
        match &events[3].payload {
            EventPayload::Usage(usage) => {
                assert_eq!(usage.input_cached_tokens, Some(4));
                assert_eq!(usage.input_text_tokens, Some(6));
                assert_eq!(usage.output_text_tokens, Some(5));
                assert_eq!(usage.total_tokens, Some(15));
            }
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_call_ids_carry_over() {
        let events = transform_all(vec![
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_abc", "type": "function",
                 "function": {"name": "calc____add", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"a\":1}"}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 1, "function": {"name": "search____query", "arguments": "{}"}}
            ]}, "finish_reason": "tool_calls"}]}),
        ]);

        assert_eq!(types(&events), vec!["tool_calls", "tool_calls", "tool_calls", "stop"]);
        let ids: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::ToolCalls(calls) => Some(calls[0].id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["call_abc", "call_abc", "search____query_1"]);
    }

    #[test]
    fn test_reasoning_delta() {
        let events = transform_all(vec![
            json!({"choices": [{"index": 0, "delta": {"reasoning_content": "Thinking"}}]}),
            json!({"choices": [{"index": 0, "delta": {"reasoning": "more"}}]}),
        ]);
        assert_eq!(
            events.iter().map(|e| e.payload.clone()).collect::<Vec<_>>(),
            vec![
                EventPayload::Reasoning("Thinking".to_string()),
                EventPayload::Reasoning("more".to_string())
            ]
        );
    }

    #[test]
    fn test_in_band_error() {
        let events = transform_all(vec![json!({
            "error": {"message": "model overloaded", "code": "overloaded"}
        })]);
        match &events[0].payload {
            EventPayload::Error(error) => {
                assert_eq!(error.error_type, ErrorType::ProviderBizError);
                assert_eq!(error.message(), Some("model overloaded"));
                assert_eq!(error.body["error"]["code"], "overloaded");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }
}

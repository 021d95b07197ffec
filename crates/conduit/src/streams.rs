//! Canonical streaming output.
//!
//! A backend's vendor stream passes through a chain of stages, each consuming and
//! producing [`StreamEvent`]s:
//!
//! vendor normalizer → [`token_speed`] → [`terminal_guard`] → [`with_callbacks`]
//!
//! All stages are lazily pulled, so a slow consumer holds back the upstream body.
//! Framing for the wire lives in [`sse`].
pub mod callbacks;
pub mod google;
pub mod guard;
pub mod openai;
pub mod protocol;
pub mod speed;
pub mod sse;

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use callbacks::{with_callbacks, CompletionSummary, StreamCallbacks};
pub use guard::terminal_guard;
pub use protocol::{
    ErrorPayload, EventPayload, EventStream, StreamContext, StreamEvent, ToolCallChunk,
    RUNTIME_ERROR_KEY,
};
pub use speed::{token_speed, SpeedOptions};

/// Settings of the stages following a vendor normalizer
#[derive(Clone)]
pub struct StreamOptions {
    pub callbacks: Option<Arc<dyn StreamCallbacks>>,
    pub cancel: CancellationToken,
    pub input_start_at: Option<Instant>,
    pub enable_streaming: bool,
    pub require_terminal_event: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            callbacks: None,
            cancel: CancellationToken::new(),
            input_start_at: None,
            enable_streaming: true,
            require_terminal_event: true,
        }
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("callbacks", &self.callbacks.is_some())
            .field("input_start_at", &self.input_start_at)
            .field("enable_streaming", &self.enable_streaming)
            .field("require_terminal_event", &self.require_terminal_event)
            .finish()
    }
}

/// Run `transform` over every vendor chunk, sharing one [`StreamContext`]
pub fn normalize<S, T, F>(
    chunks: S,
    mut context: StreamContext,
    transform: F,
) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = T>,
    F: Fn(T, &mut StreamContext) -> Vec<StreamEvent>,
{
    stream! {
        let mut chunks = Box::pin(chunks);
        while let Some(chunk) = chunks.next().await {
            for event in transform(chunk, &mut context) {
                yield event;
            }
        }
    }
}

/// Apply the speed, guard and callback stages to normalized events
pub fn finish_stream<S>(events: S, stream_id: String, options: StreamOptions) -> EventStream
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let timed = token_speed(
        events,
        SpeedOptions {
            input_start_at: options.input_start_at,
            enable_streaming: options.enable_streaming,
        },
    );
    let guarded = terminal_guard(
        timed,
        stream_id,
        options.require_terminal_event,
        options.cancel.clone(),
    );
    Box::pin(with_callbacks(guarded, options.callbacks, options.cancel))
}

/// The full chain for a Gemini `GenerateContentResponse` stream
pub fn google_stream<S>(chunks: S, options: StreamOptions) -> EventStream
where
    S: Stream<Item = google::GenerateContentResponse> + Send + 'static,
{
    let context = StreamContext::new();
    let stream_id = context.id.clone();
    let events = normalize(chunks, context, google::transform_google_chunk);
    finish_stream(events, stream_id, options)
}

/// The full chain for an OpenAI-compatible `chat.completion.chunk` stream
pub fn openai_stream<S>(chunks: S, options: StreamOptions) -> EventStream
where
    S: Stream<Item = openai::ChatCompletionChunk> + Send + 'static,
{
    let context = StreamContext::new();
    let stream_id = context.id.clone();
    let events = normalize(chunks, context, openai::transform_openai_chunk);
    finish_stream(events, stream_id, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn google_chunks(values: Vec<Value>) -> Vec<google::GenerateContentResponse> {
        values
            .into_iter()
            .map(|value| serde_json::from_value(value).unwrap())
            .collect()
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[tokio::test]
    async fn test_google_chain_ends_with_single_stop() {
        let chunks = google_chunks(vec![
            json!({"candidates": [{"content": {"parts": [{"text": "Hel"}], "role": "model"}}]}),
            json!({
                "candidates": [{
                    "content": {"parts": [{"text": "lo"}], "role": "model"},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 7
                }
            }),
        ]);

        let events: Vec<_> = google_stream(
            futures::stream::iter(chunks),
            StreamOptions {
                input_start_at: Some(Instant::now()),
                ..Default::default()
            },
        )
        .collect()
        .await;

        assert_eq!(types(&events), vec!["text", "text", "usage", "speed", "stop"]);
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.iter().all(|id| *id == ids[0] && id.starts_with("chat_")));
    }

    #[derive(Default)]
    struct Hooks {
        calls: std::sync::Mutex<Vec<&'static str>>,
    }

    impl StreamCallbacks for Hooks {
        fn on_completion(&self, _summary: &CompletionSummary) {
            self.calls.lock().unwrap().push("completion");
        }

        fn on_abort(&self) {
            self.calls.lock().unwrap().push("abort");
        }
    }

    #[tokio::test]
    async fn test_cancelled_mid_stream_reports_abort() {
        let hooks = Arc::new(Hooks::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let upstream = stream! {
            yield StreamEvent::new("c", EventPayload::Text("a".to_string()));
            trigger.cancel();
            yield StreamEvent::new("c", EventPayload::Text("b".to_string()));
            yield StreamEvent::new("c", EventPayload::Stop("stop".to_string()));
        };

        let events: Vec<_> = finish_stream(
            upstream,
            "c".to_string(),
            StreamOptions {
                callbacks: Some(hooks.clone()),
                cancel,
                ..Default::default()
            },
        )
        .collect()
        .await;

        assert!(events.iter().all(|e| !e.is_terminal()));
        assert_eq!(*hooks.calls.lock().unwrap(), vec!["abort"]);
    }

    #[tokio::test]
    async fn test_openai_chain_synthesizes_missing_terminal() {
        let chunk: openai::ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"index": 0, "delta": {"content": "partial"}}]
        }))
        .unwrap();

        let events: Vec<_> = openai_stream(futures::stream::iter(vec![chunk]), Default::default())
            .collect()
            .await;

        assert_eq!(types(&events), vec!["text", "error"]);
    }

    #[tokio::test]
    async fn test_runtime_error_marker_ends_stream() {
        let marker = openai::ChatCompletionChunk::runtime_error(&ErrorPayload::new(
            crate::errors::ErrorType::StreamChunkError,
            json!({"message": "connection reset"}),
        ));
        let text: openai::ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"index": 0, "delta": {"content": "late"}}]
        }))
        .unwrap();

        let events: Vec<_> = openai_stream(
            futures::stream::iter(vec![marker, text]),
            Default::default(),
        )
        .collect()
        .await;

        assert_eq!(types(&events), vec!["error"]);
        match &events[0].payload {
            EventPayload::Error(error) => assert_eq!(error.message(), Some("connection reset")),
            other => panic!("expected error, got {other:?}"),
        }
    }
}

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::protocol::{
    ErrorPayload, EventPayload, GroundingSearch, StreamEvent, TokenSpeed, ToolCallChunk,
};
use crate::models::usage::ModelTokensUsage;

/// Hooks invoked as canonical events pass by.
///
/// Hooks run inline with delivery and should hand slow work off instead of
/// blocking. Every method defaults to doing nothing.
pub trait StreamCallbacks: Send + Sync {
    fn on_start(&self) {}

    fn on_text(&self, _text: &str) {}

    fn on_reasoning(&self, _reasoning: &str) {}

    /// Tool calls accumulated so far, arguments merged by call index
    fn on_tool_calls(&self, _tool_calls: &[ToolCallChunk]) {}

    fn on_usage(&self, _usage: &ModelTokensUsage) {}

    fn on_grounding(&self, _grounding: &GroundingSearch) {}

    /// The stream ended, with or without a terminal event
    fn on_completion(&self, _summary: &CompletionSummary) {}

    /// The stream was cancelled, or dropped by the consumer, before it ended
    fn on_abort(&self) {}
}

/// Everything a finished stream produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionSummary {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallChunk>,
    pub usage: Option<ModelTokensUsage>,
    pub grounding: Option<GroundingSearch>,
    pub speed: Option<TokenSpeed>,
    pub images: Vec<String>,
    pub stop_reason: Option<String>,
    pub error: Option<ErrorPayload>,
}

impl CompletionSummary {
    fn merge_tool_calls(&mut self, chunks: &[ToolCallChunk]) {
        for chunk in chunks {
            match self.tool_calls.iter_mut().find(|c| c.index == chunk.index) {
                Some(call) => {
                    call.function.arguments.push_str(&chunk.function.arguments);
                    if call.function.name.is_none() {
                        call.function.name = chunk.function.name.clone();
                    }
                }
                None => self.tool_calls.push(chunk.clone()),
            }
        }
    }
}

struct AbortGuard {
    callbacks: Arc<dyn StreamCallbacks>,
    finished: bool,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.callbacks.on_abort();
        }
    }
}

/// Invoke `callbacks` for every event, passing events through unchanged.
///
/// An upstream that ends after `cancel` fired without delivering a terminal
/// event reports `on_abort` rather than `on_completion`.
pub fn with_callbacks<S>(
    events: S,
    callbacks: Option<Arc<dyn StreamCallbacks>>,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = StreamEvent>,
{
    stream! {
        let mut events = Box::pin(events);
        let Some(callbacks) = callbacks else {
            while let Some(event) = events.next().await {
                yield event;
            }
            return;
        };

        let mut guard = AbortGuard {
            callbacks: callbacks.clone(),
            finished: false,
        };
        let mut summary = CompletionSummary::default();
        callbacks.on_start();

        while let Some(event) = events.next().await {
            match &event.payload {
                EventPayload::Text(text) => {
                    summary.text.push_str(text);
                    callbacks.on_text(text);
                }
                EventPayload::Reasoning(reasoning) => {
                    summary
                        .reasoning
                        .get_or_insert_with(String::new)
                        .push_str(reasoning);
                    callbacks.on_reasoning(reasoning);
                }
                EventPayload::ToolCalls(chunks) => {
                    summary.merge_tool_calls(chunks);
                    callbacks.on_tool_calls(&summary.tool_calls);
                }
                EventPayload::Usage(usage) => {
                    summary.usage = Some(usage.clone());
                    callbacks.on_usage(usage);
                }
                EventPayload::Grounding(grounding) => {
                    summary.grounding = Some(grounding.clone());
                    callbacks.on_grounding(grounding);
                }
                EventPayload::Base64Image(image) => summary.images.push(image.clone()),
                EventPayload::Speed(speed) => summary.speed = Some(*speed),
                EventPayload::Stop(reason) => summary.stop_reason = Some(reason.clone()),
                EventPayload::Error(error) => summary.error = Some(error.clone()),
            }
            yield event;
        }

        guard.finished = true;
        let terminated = summary.stop_reason.is_some() || summary.error.is_some();
        if cancel.is_cancelled() && !terminated {
            callbacks.on_abort();
        } else {
            callbacks.on_completion(&summary);
        }
    }
}

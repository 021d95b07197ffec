use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::protocol::{ErrorPayload, EventPayload, StreamEvent};
use crate::errors::ErrorType;

/// Enforces exactly one terminal event, delivered last.
///
/// The first `stop` is held back until the upstream closes so accounting that
/// follows it still reaches the consumer first; further `stop`s are dropped. An
/// `error` ends the stream at once. A cancelled stream ends without any terminal
/// event.
pub fn terminal_guard<S>(
    events: S,
    stream_id: String,
    require_terminal_event: bool,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = StreamEvent>,
{
    stream! {
        let mut events = Box::pin(events);
        let mut pending_stop = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(stream_id = %stream_id, "stream cancelled");
                    return;
                }
                next = events.next() => next,
            };

            let Some(event) = next else { break };
            if matches!(event.payload, EventPayload::Error(_)) {
                yield event;
                return;
            }
            if matches!(event.payload, EventPayload::Stop(_)) {
                if pending_stop.is_none() {
                    pending_stop = Some(event);
                }
                continue;
            }
            yield event;
        }

        if let Some(stop) = pending_stop {
            yield stop;
        } else if require_terminal_event {
            warn!(stream_id = %stream_id, "upstream closed without a terminal event");
            yield StreamEvent::new(
                stream_id.clone(),
                EventPayload::Error(ErrorPayload::new(
                    ErrorType::StreamChunkError,
                    json!({ "message": "Stream ended without a terminal event" }),
                )),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usage::ModelTokensUsage;

    fn event(payload: EventPayload) -> StreamEvent {
        StreamEvent::new("c", payload)
    }

    fn text(s: &str) -> StreamEvent {
        event(EventPayload::Text(s.to_string()))
    }

    fn stop() -> StreamEvent {
        event(EventPayload::Stop("stop".to_string()))
    }

    fn error() -> StreamEvent {
        event(EventPayload::Error(ErrorPayload::new(
            ErrorType::ProviderBizError,
            json!({"message": "boom"}),
        )))
    }

    async fn guarded(input: Vec<StreamEvent>, require_terminal_event: bool) -> Vec<StreamEvent> {
        terminal_guard(
            futures::stream::iter(input),
            "c".to_string(),
            require_terminal_event,
            CancellationToken::new(),
        )
        .collect()
        .await
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[tokio::test]
    async fn test_stop_is_delivered_last() {
        let usage = event(EventPayload::Usage(ModelTokensUsage::new(Some(1), Some(2))));
        let out = guarded(vec![text("a"), stop(), usage, stop()], true).await;
        assert_eq!(types(&out), vec!["text", "usage", "stop"]);
    }

    #[tokio::test]
    async fn test_error_ends_the_stream() {
        let out = guarded(vec![text("a"), stop(), error(), text("b")], true).await;
        assert_eq!(types(&out), vec!["text", "error"]);
    }

    #[tokio::test]
    async fn test_missing_terminal_is_synthesized() {
        let out = guarded(vec![text("a")], true).await;
        assert_eq!(types(&out), vec!["text", "error"]);
        match &out[1].payload {
            EventPayload::Error(payload) => {
                assert_eq!(payload.error_type, ErrorType::StreamChunkError)
            }
            other => panic!("unexpected {other:?}"),
        }

        let out = guarded(vec![text("a")], false).await;
        assert_eq!(types(&out), vec!["text"]);
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_for_any_sequence() {
        let sequences = vec![
            vec![],
            vec![stop(), stop()],
            vec![error(), error()],
            vec![stop(), error()],
            vec![text("a"), stop(), text("b")],
        ];
        for input in sequences {
            let out = guarded(input, true).await;
            let terminals = out.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminals, 1);
            assert!(out.last().unwrap().is_terminal());
        }
    }

    #[tokio::test]
    async fn test_cancelled_stream_has_no_terminal() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let upstream = stream! {
            yield text("a");
            trigger.cancel();
            yield text("b");
            yield stop();
        };

        let out: Vec<_> = terminal_guard(upstream, "c".to_string(), true, cancel)
            .collect()
            .await;
        assert!(!out.is_empty());
        assert!(out.iter().all(|e| !e.is_terminal()));
    }
}

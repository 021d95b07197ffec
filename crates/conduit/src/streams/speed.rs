use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::time::Instant;

use super::protocol::{EventPayload, StreamEvent, TokenSpeed};
use crate::models::usage::ModelTokensUsage;

/// Timing basis of the speed stage
#[derive(Debug, Clone, Copy)]
pub struct SpeedOptions {
    /// When the request was sent; without it no speed is reported
    pub input_start_at: Option<Instant>,
    /// Streaming requests measure from the first output, others from the request start
    pub enable_streaming: bool,
}

fn is_output(payload: &EventPayload) -> bool {
    matches!(
        payload,
        EventPayload::Text(_)
            | EventPayload::Reasoning(_)
            | EventPayload::ToolCalls(_)
            | EventPayload::Base64Image(_)
    )
}

fn output_tokens(usage: &ModelTokensUsage) -> Option<u64> {
    usage.total_output_tokens.or_else(|| {
        match (usage.output_text_tokens, usage.output_reasoning_tokens) {
            (None, None) => None,
            (text, reasoning) => Some(text.unwrap_or(0) + reasoning.unwrap_or(0)),
        }
    })
}

fn measure(
    usage: &ModelTokensUsage,
    input_start_at: Instant,
    output_start_at: Option<Instant>,
    enable_streaming: bool,
) -> TokenSpeed {
    let now = Instant::now();
    let basis = match (enable_streaming, output_start_at) {
        (true, Some(first_output)) => first_output,
        _ => input_start_at,
    };
    let elapsed = now.duration_since(basis).as_secs_f64();

    TokenSpeed {
        tps: output_tokens(usage)
            .filter(|_| elapsed > 0.0)
            .map(|tokens| tokens as f64 / elapsed),
        ttft: output_start_at
            .map(|first_output| first_output.duration_since(input_start_at).as_secs_f64() * 1000.0),
    }
}

/// Follows every `usage` event with a `speed` event
pub fn token_speed<S>(events: S, options: SpeedOptions) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = StreamEvent>,
{
    stream! {
        let mut events = Box::pin(events);
        let mut output_start_at = None;

        while let Some(event) = events.next().await {
            if output_start_at.is_none() && is_output(&event.payload) {
                output_start_at = Some(Instant::now());
            }

            let speed = match (&event.payload, options.input_start_at) {
                (EventPayload::Usage(usage), Some(input_start_at)) => Some(StreamEvent::new(
                    event.id.clone(),
                    EventPayload::Speed(measure(
                        usage,
                        input_start_at,
                        output_start_at,
                        options.enable_streaming,
                    )),
                )),
                _ => None,
            };

            yield event;
            if let Some(speed) = speed {
                yield speed;
            }
        }
    }
}

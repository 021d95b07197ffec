//! Server-sent event framing of canonical events.
//!
//! Each event becomes `id: <id>\nevent: <type>\ndata: <json>\n\n`.
use std::convert::Infallible;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};

use super::protocol::{EventPayload, StreamEvent};

pub fn to_sse_frame(event: &StreamEvent) -> String {
    let data = serde_json::to_string(&event.data()).unwrap_or_else(|_| "null".to_string());
    format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        event.id,
        event.event_type(),
        data
    )
}

/// Frame every event as a body chunk
pub fn sse_body<S>(events: S) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    S: Stream<Item = StreamEvent>,
{
    events.map(|event| Ok(Bytes::from(to_sse_frame(&event))))
}

impl StreamEvent {
    /// Read one frame back. Frames of event types this version does not know yield
    /// `None`.
    pub fn parse_frame(frame: &str) -> Option<StreamEvent> {
        let mut id = None;
        let mut event_type = None;
        let mut data = Vec::new();

        for line in frame.lines() {
            if let Some(value) = line.strip_prefix("id:") {
                id = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }

        let event_type = event_type?;
        let data: Value = serde_json::from_str(&data.join("\n")).ok()?;
        let payload: EventPayload =
            serde_json::from_value(json!({ "type": event_type, "data": data })).ok()?;
        Some(StreamEvent::new(id.unwrap_or_default(), payload))
    }
}

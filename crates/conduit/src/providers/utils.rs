use std::time::Duration;

use async_stream::stream;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::errors::{ChatCompletionError, ErrorType, RuntimeError, RuntimeResult};
use crate::streams::ErrorPayload;

pub fn http_client() -> RuntimeResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(600)) // 10 minutes timeout
        .build()
        .map_err(|err| RuntimeError::Configuration(format!("failed to build http client: {err}")))
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Whether an OpenAI style error object reports an over-long prompt
pub fn is_context_length_error(error: &Value) -> bool {
    matches!(
        error.get("code").and_then(Value::as_str),
        Some("context_length_exceeded") | Some("string_above_max_length")
    )
}

/// Turn an upstream failure response into a typed error
pub fn classify_error(provider: &str, status: u16, body: Option<Value>) -> ChatCompletionError {
    let upstream = body.as_ref().map(|body| body.get("error").unwrap_or(body));

    let error_type = match upstream {
        Some(error) if is_context_length_error(error) => ErrorType::ExceededContextWindow,
        _ => ErrorType::from_status(status),
    };
    let message = upstream
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {status}"));

    let error = ChatCompletionError::new(error_type, provider, message).with_status(status);
    match body {
        Some(body) => error.with_body(body),
        None => error,
    }
}

pub fn transport_error(provider: &str, err: reqwest::Error) -> RuntimeError {
    error!(provider, error = %err, "upstream request failed");
    let status = err.status().map(|status| status.as_u16());
    let error = ChatCompletionError::new(
        ErrorType::ProviderBizError,
        provider,
        format!("Request to {provider} failed: {err}"),
    );
    RuntimeError::Provider(match status {
        Some(status) => error.with_status(status),
        None => error,
    })
}

/// Send `request` and fail on non-success statuses. Cancelling abandons the request.
pub async fn send(
    provider: &str,
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> RuntimeResult<Response> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
        response = request.send() => response.map_err(|err| transport_error(provider, err))?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<Value>(&text)
        .ok()
        .or_else(|| (!text.is_empty()).then(|| json!({ "message": text })));
    let error = classify_error(provider, status.as_u16(), body);
    error!(provider, status = status.as_u16(), error_type = %error.error_type, "upstream returned an error");
    Err(RuntimeError::Provider(error))
}

/// Parse `response` as server-sent events carrying JSON chunks of type `T`.
///
/// A transport or parse failure is reported as a final chunk built by `marker`, so it
/// travels down the same stream as the vendor's own chunks.
pub fn sse_chunks<T, F>(
    response: Response,
    provider: &'static str,
    marker: F,
) -> impl Stream<Item = T> + Send
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(&ErrorPayload) -> T + Send + 'static,
{
    stream! {
        let mut events = Box::pin(response.bytes_stream().eventsource());
        while let Some(event) = events.next().await {
            let data = match event {
                Ok(event) => event.data,
                Err(err) => {
                    error!(provider, error = %err, "upstream stream failed");
                    yield marker(&ErrorPayload::new(
                        ErrorType::StreamChunkError,
                        json!({ "message": err.to_string(), "provider": provider }),
                    ));
                    return;
                }
            };

            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<T>(data) {
                Ok(chunk) => yield chunk,
                Err(err) => {
                    error!(provider, error = %err, "unparseable stream chunk");
                    yield marker(&ErrorPayload::new(
                        ErrorType::StreamChunkError,
                        json!({ "message": err.to_string(), "provider": provider, "chunk": data }),
                    ));
                    return;
                }
            }
        }
    }
}

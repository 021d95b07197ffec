use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use conduit::context::AssemblyRequest;
use conduit::model_bank::ModelCapabilities;
use conduit::models::tool::{tool_calling_name, Tool};
use conduit::runtime::{ChatOptions, ChatPayload};
use conduit::streams::sse::sse_body;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(flatten)]
    assembly: AssemblyRequest,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

async fn handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let runtime = state
        .runtime(&provider)
        .ok_or_else(|| ApiError::unknown_provider(&provider))?;

    let ChatRequest {
        mut assembly,
        temperature,
        max_tokens,
        stream,
    } = request;
    if assembly.model.is_empty() {
        return Err(ApiError::bad_request(&provider, "model is required"));
    }
    assembly.provider = provider.clone();

    let model = assembly.model.clone();
    let tools: Vec<Tool> = if state.model_bank.can_use_function_call(&model, &provider) {
        assembly
            .tools
            .iter()
            .flat_map(|manifest| manifest.to_tools(tool_calling_name))
            .collect()
    } else {
        Vec::new()
    };

    // Cancelled once the response body, or this handler, is dropped
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let messages = state
        .assembler
        .assemble(assembly, cancel.clone())
        .await
        .map_err(|err| ApiError::context(err, &provider))?;

    let mut payload = ChatPayload::new(model, messages);
    payload.tools = tools;
    payload.temperature = temperature;
    payload.max_tokens = max_tokens;
    payload.stream = stream;

    let options = ChatOptions {
        cancel,
        ..Default::default()
    };
    let events = runtime
        .chat(payload, options)
        .await
        .map_err(|err| ApiError::runtime(err, &provider))?;
    let events = events.map(move |event| {
        let _guard = &guard;
        event
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(sse_body(events)),
    )
        .into_response())
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/webapi/chat/:provider", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_string, state};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_request(provider: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/webapi/chat/{provider}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_chat_streams_sse_frames() {
        let server = MockServer::start().await;
        let chunks = [
            json!({"id": "c1", "choices": [{"index": 0, "delta": {"content": "Hello!"}}]}),
            json!({"id": "c1", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
        ];
        let body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "Be kind."},
                    {"role": "user", "content": "Hi"}
                ],
                "temperature": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let app = routes(state(&server.uri(), Some(vec!["gpt-4o".to_string()])));
        let response = app
            .oneshot(chat_request(
                "openai",
                json!({
                    "model": "gpt-4o",
                    "systemRole": "Be kind.",
                    "messages": [{"id": "m1", "role": "user", "content": "Hi"}],
                    "temperature": 0.5
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );
        let body = body_string(response.into_body()).await;
        assert!(body.contains("event: text\ndata: \"Hello!\"\n\n"));
        assert!(body.ends_with("event: stop\ndata: \"stop\"\n\n"));
    }

    #[tokio::test]
    async fn test_upstream_errors_become_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
            })))
            .mount(&server)
            .await;

        let app = routes(state(&server.uri(), None));
        let response = app
            .oneshot(chat_request(
                "openai",
                json!({"model": "gpt-4o", "messages": [{"id": "m1", "role": "user", "content": "Hi"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_str(&body_string(response.into_body()).await).unwrap();
        assert_eq!(body["errorType"], "InvalidProviderAPIKey");
        assert_eq!(body["body"]["provider"], "openai");
        assert_eq!(
            body["body"]["error"]["error"]["message"],
            "Incorrect API key provided"
        );
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let app = routes(state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(chat_request("anthropic", json!({"model": "claude", "messages": []})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_string(response.into_body()).await).unwrap();
        assert_eq!(body["errorType"], "AgentRuntimeError");
        assert_eq!(body["body"]["provider"], "anthropic");
    }

    #[tokio::test]
    async fn test_missing_model() {
        let app = routes(state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(chat_request("openai", json!({"messages": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

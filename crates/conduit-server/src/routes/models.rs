use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use conduit::model_bank::ModelCard;
use serde::Deserialize;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct InvalidateQuery {
    registration: Option<String>,
}

async fn list_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<Vec<ModelCard>>, ApiError> {
    let runtime = state
        .runtime(&provider)
        .ok_or_else(|| ApiError::unknown_provider(&provider))?;
    let models = runtime
        .models()
        .await
        .map_err(|err| ApiError::runtime(err, &provider))?;
    Ok(Json(models))
}

async fn invalidate_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<InvalidateQuery>,
) -> Result<StatusCode, ApiError> {
    let runtime = state
        .runtime(&provider)
        .ok_or_else(|| ApiError::unknown_provider(&provider))?;
    runtime.invalidate_model_cache(query.registration.as_deref());
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/webapi/models/:provider", get(list_handler))
        .route("/webapi/models/:provider/invalidate", post(invalidate_handler))
        .with_state(state)
}

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chatlens_core::types::ChatMessage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ApiError;
use crate::http_server::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub result: Option<String>,
}

/// Handler for `POST /api/generate`: one stateless prompt, one reply
pub async fn handle_generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload?;
    let prompt = request
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Prompt is required".to_string()))?;

    debug!(prompt_len = prompt.len(), "Generating free-text reply");
    let result = state
        .backend
        .complete(
            &[ChatMessage::user(prompt)],
            state.config.completion.generate_max_tokens(),
        )
        .await?;

    Ok(Json(GenerateResponse { result }))
}

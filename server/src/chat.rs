use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chatlens_core::types::{ChatHistory, ChatMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::ApiError;
use crate::http_server::AppState;

/// Request body for `POST /api/chat`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// When set, the stored file content and history are used instead of the fields below
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub file_content: Option<String>,
    /// Kept loose so a malformed history degrades to an empty one
    #[serde(default)]
    pub chat_history: Value,
    #[serde(default)]
    pub user_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub chat_history: ChatHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub file_content: String,
    pub chat_history: ChatHistory,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Turns whatever the client sent as history into a conversation.
///
/// Non-arrays become an empty history and elements that are not messages are dropped.
pub fn coerce_history(value: Value) -> ChatHistory {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        _ => {
            warn!("chatHistory is not an array, starting from an empty history");
            return Vec::new();
        }
    };

    let total = items.len();
    let history: ChatHistory = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if history.len() != total {
        warn!(
            dropped = total - history.len(),
            "Dropped malformed chatHistory entries"
        );
    }
    history
}

/// System framing, then the prior conversation, then the new question.
///
/// The system message is rebuilt on every turn and never stored in history.
pub fn build_messages(
    file_content: &str,
    history: &[ChatMessage],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "You are an assistant helping with analysis of this file:\n\n{}",
        file_content
    )));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Handler for `POST /api/chat`
pub async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let user_message = request
        .user_message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("userMessage is required".to_string()))?;

    let session = match &request.session_id {
        Some(id) => Some(state.sessions.get_session(id).await?),
        None => None,
    };

    let (file_content, mut history) = match session {
        Some(session) => (session.file_content, session.history),
        None => (
            request.file_content.unwrap_or_default(),
            coerce_history(request.chat_history),
        ),
    };

    let messages = build_messages(&file_content, &history, &user_message);
    debug!(messages = messages.len(), "Sending chat turn");
    let reply = state
        .backend
        .complete(&messages, state.config.completion.max_tokens())
        .await?
        .unwrap_or_default();

    let session_id = match request.session_id {
        Some(id) => {
            // Appended against the stored copy so overlapping turns both land
            let session = state
                .sessions
                .append_turn(&id, user_message, reply.clone(), state.session_ttl())
                .await?;
            info!(session_id = %id, entries = session.history.len(), "Chat turn recorded");
            history = session.history;
            Some(id)
        }
        None => {
            history.push(ChatMessage::user(user_message));
            history.push(ChatMessage::assistant(reply.clone()));
            None
        }
    };

    Ok(Json(ChatResponse {
        reply,
        chat_history: history,
        session_id,
    }))
}

/// One row of `GET /api/sessions`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub entries: usize,
}

/// Handler for `GET /api/sessions`: live sessions, oldest first
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let mut sessions = state.sessions.list_sessions().await?;
    sessions.sort_by_key(|session| session.created_at);
    Ok(Json(
        sessions
            .into_iter()
            .map(|session| SessionSummary {
                session_id: session.id,
                created_at: session.created_at,
                expires_at: session.expires_at,
                entries: session.history.len(),
            })
            .collect(),
    ))
}

/// Handler for `GET /api/sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.sessions.get_session(&id).await?;
    Ok(Json(SessionResponse {
        session_id: session.id,
        file_content: session.file_content,
        chat_history: session.history,
        expires_at: session.expires_at,
    }))
}

/// Handler for `DELETE /api/sessions/{id}`
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.delete_session(&id).await?;
    info!(session_id = %id, "Session ended");
    Ok(StatusCode::NO_CONTENT)
}

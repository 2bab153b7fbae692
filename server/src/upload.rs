use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{IntoResponse, Response},
    Json,
};
use chatlens_core::errors::CompletionError;
use chatlens_core::types::ChatHistory;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::info;

use crate::analysis::{analyze_text, Analysis, FileAnalysis, TextAnalysis};
use crate::archive::{extract_text_entries, TextEntry};
use crate::errors::ApiError;
use crate::http_server::AppState;
use crate::session::Session;
use crate::storage::sanitize_file_name;

/// Response body for every upload outcome, including failures
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEnvelope {
    pub analysis: Option<Analysis>,
    pub file_content: String,
    pub chat_history: ChatHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl UploadEnvelope {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Upload failure rendered as an empty envelope carrying `error`
#[derive(Debug)]
pub struct UploadRejection(pub ApiError);

impl<E> From<E> for UploadRejection
where
    E: Into<ApiError>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for UploadRejection {
    fn into_response(self) -> Response {
        let error = self.0.logged();
        let body = UploadEnvelope {
            error: Some(error.to_string()),
            ..Default::default()
        };
        (error.status(), Json(body)).into_response()
    }
}

/// Accepted upload types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    PlainText,
    Csv,
    Zip,
}

impl UploadKind {
    /// Maps a declared MIME type onto the allow-list, ignoring parameters such as charset
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/plain" => Some(Self::PlainText),
            "text/csv" | "application/vnd.ms-excel" => Some(Self::Csv),
            "application/zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

/// The `file` field of an upload form
#[derive(Debug)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

async fn read_file_field(mut multipart: Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?.to_vec();
        return Ok(Some(UploadedFile {
            name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

/// Handler for `POST /api/upload`
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadEnvelope>, UploadRejection> {
    let file = read_file_field(multipart?)
        .await?
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    let kind = UploadKind::from_mime(&file.content_type).ok_or_else(|| {
        ApiError::BadRequest("Only .txt, .csv, and .zip files are allowed".to_string())
    })?;

    info!(
        file = %file.name,
        content_type = %file.content_type,
        bytes = file.bytes.len(),
        "Received upload"
    );

    // Runs before the branch; a later failure leaves the object in place
    let s3_url = match &state.object_sink {
        Some(sink) => Some(
            sink.put(&sanitize_file_name(&file.name), &file.bytes, &file.content_type)
                .await?,
        ),
        None => None,
    };

    let mut envelope = match kind {
        UploadKind::PlainText => analyze_text_upload(&state, &file).await?,
        UploadKind::Zip => analyze_archive_upload(&state, &file).await?,
        UploadKind::Csv => {
            state.uploads.save(&file.name, &file.bytes).await?;
            UploadEnvelope::message("File uploaded successfully (not analyzed).")
        }
    };
    envelope.s3_url = s3_url;

    Ok(Json(envelope))
}

async fn analyze_text_upload(
    state: &AppState,
    file: &UploadedFile,
) -> Result<UploadEnvelope, ApiError> {
    let path = state.uploads.save(&file.name, &file.bytes).await?;
    let content = state.uploads.read_text(&path).await?;

    let TextAnalysis { analysis, history } = analyze_text(
        state.backend.as_ref(),
        &content,
        state.config.completion.max_tokens(),
    )
    .await?;

    let session_id = open_session(state, &content, &history).await?;

    Ok(UploadEnvelope {
        analysis: Some(analysis),
        file_content: content,
        chat_history: history,
        message: Some("File uploaded and analyzed.".to_string()),
        session_id: Some(session_id),
        ..Default::default()
    })
}

async fn analyze_archive_upload(
    state: &AppState,
    file: &UploadedFile,
) -> Result<UploadEnvelope, ApiError> {
    let entries = extract_text_entries(&file.bytes, state.config.max_upload_bytes)?;
    if entries.is_empty() {
        info!(file = %file.name, "Archive holds no .txt entries");
        return Ok(UploadEnvelope::message("No .txt files found in the zip."));
    }

    for entry in &entries {
        state.uploads.save(&entry.name, entry.content.as_bytes()).await?;
    }

    let backend = state.backend.as_ref();
    let max_tokens = state.config.completion.max_tokens();
    let mut analyzed: Vec<(TextEntry, TextAnalysis)> = stream::iter(entries)
        .map(|entry| async move {
            let result = analyze_text(backend, &entry.content, max_tokens).await?;
            Ok::<_, CompletionError>((entry, result))
        })
        .buffered(state.config.analysis_concurrency.max(1))
        .try_collect()
        .await?;

    let count = analyzed.len();
    info!(file = %file.name, entries = count, "Analyzed archive");

    // Content and history are only meaningful for a single-entry archive
    let (file_content, chat_history, session_id) = match analyzed.as_slice() {
        [(entry, result)] => {
            let session_id = open_session(state, &entry.content, &result.history).await?;
            (
                entry.content.clone(),
                result.history.clone(),
                Some(session_id),
            )
        }
        _ => (String::new(), Vec::new(), None),
    };

    let files = analyzed
        .drain(..)
        .map(|(entry, result)| FileAnalysis {
            file: entry.name,
            content: entry.content,
            analysis: result.analysis,
        })
        .collect();

    Ok(UploadEnvelope {
        analysis: Some(Analysis::Archive { files }),
        file_content,
        chat_history,
        message: Some(format!("Zip uploaded and {} .txt files analyzed.", count)),
        session_id,
        ..Default::default()
    })
}

async fn open_session(
    state: &AppState,
    content: &str,
    history: &ChatHistory,
) -> Result<String, ApiError> {
    let mut session = Session::new(content.to_string(), history.clone());
    session.touch(state.session_ttl());
    let session = state.sessions.create_session(session).await?;
    Ok(session.id)
}

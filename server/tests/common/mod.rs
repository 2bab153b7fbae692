#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chatlens_core::client::CompletionBackend;
use chatlens_core::errors::{CompletionError, CompletionResult};
use chatlens_core::types::ChatMessage;
use chatlens_server::config::ServerConfig;
use chatlens_server::http_server::{router, AppState};
use chatlens_server::session::InMemorySessionStore;
use chatlens_server::storage::{ObjectSink, StorageError};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const REPORT: &str = r#"{"character_analysis":["민수: 조용함"],"awards":["수다왕: 지영"],"if_category":["회사라면 사장은 민수"]}"#;

type ReplyFn = dyn Fn(&[ChatMessage]) -> CompletionResult<Option<String>> + Send + Sync;

/// Completion backend whose reply is computed from the request
pub struct FakeBackend {
    reply: Box<ReplyFn>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeBackend {
    pub fn new<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&[ChatMessage]) -> CompletionResult<Option<String>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with `text`
    pub fn fixed(text: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(Some(text.to_string())))
    }

    pub fn failing() -> Arc<Self> {
        Self::new(|_| {
            Err(CompletionError::HttpError {
                status_code: 500,
                message: "provider down".to_string(),
            })
        })
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
    ) -> CompletionResult<Option<String>> {
        self.calls.lock().unwrap().push(messages.to_vec());
        // Lets later archive entries finish first
        if messages.last().is_some_and(|m| m.content.contains("SLOW")) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        (self.reply)(messages)
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

/// Object sink that remembers what it was given
#[derive(Default)]
pub struct RecordingSink {
    pub puts: Mutex<Vec<(String, Vec<u8>, String)>>,
    pub fail: bool,
}

#[async_trait]
impl ObjectSink for RecordingSink {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Put {
                key: key.to_string(),
                message: "AccessDenied".to_string(),
            });
        }
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.to_vec(), content_type.to_string()));
        Ok(format!("https://bucket.example/{}", key))
    }
}

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<FakeBackend>,
    pub sink: Option<Arc<RecordingSink>>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self::build(backend, None, ServerConfig::default())
    }

    pub fn with_sink(backend: Arc<FakeBackend>, sink: RecordingSink) -> Self {
        Self::build(backend, Some(Arc::new(sink)), ServerConfig::default())
    }

    pub fn build(
        backend: Arc<FakeBackend>,
        sink: Option<Arc<RecordingSink>>,
        mut config: ServerConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        config.uploads_dir = dir.path().join("uploads");

        let state = AppState::new(
            config,
            backend.clone(),
            sink.clone().map(|s| s as Arc<dyn ObjectSink>),
            Arc::new(InMemorySessionStore::new()),
        );

        Self {
            router: router(state),
            backend,
            sink,
            dir,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn uploaded_files(&self) -> Vec<String> {
        match std::fs::read_dir(self.uploads_dir()) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_form(&self, uri: &str, form: MultipartForm) -> (StatusCode, Value) {
        let (content_type, body) = form.build();
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn upload(&self, file_name: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
        self.post_form(
            "/api/upload",
            MultipartForm::new().file("file", file_name, content_type, data),
        )
        .await
    }
}

const BOUNDARY: &str = "chatlens-test-boundary";

/// Minimal multipart/form-data encoder
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        write!(
            self.body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .unwrap();
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        write!(
            self.body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .unwrap();
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn build(mut self) -> (String, Vec<u8>) {
        write!(self.body, "--{BOUNDARY}--\r\n").unwrap();
        (
            format!("multipart/form-data; boundary={BOUNDARY}"),
            self.body,
        )
    }
}

/// Builds an in-memory zip archive; names ending in `/` become directories
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::errors::{CompletionError, CompletionResult};
use crate::types::*;

/// Anything that can turn a conversation into the text of one completion.
///
/// Every call is attempted exactly once. Transport and provider failures are returned
/// to the caller, which decides how they surface.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the text of the first choice, or `None` when the provider returned no text
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> CompletionResult<Option<String>>;

    /// Model identifier used for every request (for logging)
    fn model_name(&self) -> &str;
}

/// Client for an OpenAI-compatible chat-completions API
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http_client: Client,
    model_name: String,
    base_url: String,
}

impl CompletionClient {
    /// Create a new completion client
    pub fn new(config: &CompletionConfig) -> CompletionResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CompletionError::ConfigError(
                    "API key is required to initialize the completion client".to_string(),
                )
            })?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| CompletionError::ConfigError(format!("Invalid API key format: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs()))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            model_name: config.model_name().to_string(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> CompletionResult<Option<String>> {
        debug!(
            model = %self.model_name,
            messages = messages.len(),
            max_tokens,
            "Sending completion request"
        );

        let request = CompletionRequest {
            model: &self.model_name,
            messages,
            max_tokens,
        };

        let response = self
            .http_client
            .post(self.api_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::RequestError(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<ProviderErrorResponse>(&body) {
                return Err(CompletionError::ApiError {
                    message: error_response.error.message,
                    error_type: error_response
                        .error
                        .error_type
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }
            return Err(CompletionError::HttpError {
                status_code: status.as_u16(),
                message: format!("API request failed: {}", body),
            });
        }

        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::ParsingError(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                total = usage.total_tokens,
                "Completion token usage"
            );
        }

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

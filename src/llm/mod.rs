//! Completion and embedding service clients.
//!
//! Both services are request-path dependencies, so the HTTP clients carry a
//! timeout ceiling from configuration. Components receive explicitly
//! constructed `Arc<dyn ...>` handles — no lazy global clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::error::LlmError;

// ── Traits ──────────────────────────────────────────────────────────

/// A chat-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A chat-completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Language-model completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Text-embedding service.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

// ── HTTP clients (OpenAI-compatible API) ────────────────────────────

/// Completion client over an OpenAI-compatible `/v1/chat/completions` API.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: secrecy::SecretString,
    model: String,
}

#[derive(Serialize)]
struct ChatMessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessageBody<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl HttpCompletionClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                service: "completion".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.completion_model.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: vec![
                ChatMessageBody {
                    role: "system",
                    content: &request.system,
                },
                ChatMessageBody {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                service: "completion".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                service: "completion".into(),
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: ChatResponseBody =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                service: "completion".into(),
                reason: e.to_string(),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                service: "completion".into(),
                reason: "empty choices array".into(),
            })?;

        Ok(CompletionResponse { content })
    }
}

/// Embedding client over an OpenAI-compatible `/v1/embeddings` API.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: secrecy::SecretString,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequestBody<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                service: "embedding".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequestBody {
            model: &self.model,
            input: text,
        };

        let response = self
            .http
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                service: "embedding".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                service: "embedding".into(),
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: EmbeddingResponseBody =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                service: "embedding".into(),
                reason: e.to_string(),
            })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse {
                service: "embedding".into(),
                reason: "empty data array".into(),
            })
    }
}

/// Construct both service handles from settings.
pub fn create_clients(
    settings: &LlmSettings,
) -> Result<(Arc<dyn CompletionClient>, Arc<dyn EmbeddingClient>), LlmError> {
    let completion = HttpCompletionClient::new(settings)?;
    let embedding = HttpEmbeddingClient::new(settings)?;
    tracing::info!(
        completion_model = %settings.completion_model,
        embedding_model = %settings.embedding_model,
        "LLM service clients ready"
    );
    Ok((Arc::new(completion), Arc::new(embedding)))
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompt::ChatMessage;
use crate::errors::AssistError;

/// JSON body of an OpenAI-compatible chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub temperature: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: Option<String>,
}

/// Whatever came back from the endpoint, success or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No response was received.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: err.to_string(),
            source: Box::new(err),
        }
    }
}

impl From<TransportError> for AssistError {
    fn from(err: TransportError) -> Self {
        AssistError::Network {
            message: err.message,
            source: err.source,
        }
    }
}

/// One outbound POST per call. Implementations must not retry.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        bearer: &str,
        request: &ChatCompletionRequest,
    ) -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("StrudelAI-Core/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        bearer: &str,
        request: &ChatCompletionRequest,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await
            .map_err(TransportError::new)?;
        let status = response.status().as_u16();
        Ok(received(status, response.text().await))
    }
}

/// A status line was received, so a failed body read is not a transport
/// failure; the body is treated as empty.
fn received<E: std::fmt::Display>(status: u16, body: Result<String, E>) -> TransportResponse {
    let body = body.unwrap_or_else(|err| {
        log::debug!(target: "strudel_ai::generate", "could not read {status} response body: {err}");
        String::new()
    });
    TransportResponse { status, body }
}

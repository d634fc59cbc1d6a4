use std::sync::Arc;

use anyhow::Result;

use super::config::ConfigResolver;
use super::prompt::{build_messages, SystemPrompt};
use super::sanitize::sanitize;
use super::transport::{
    ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse, ChatTransport, HttpTransport,
};
use crate::errors::AssistError;

/// Sanitized source text returned to the caller.
pub type GeneratedArtifact = String;

const LOG_TARGET: &str = "strudel_ai::generate";

/// Runs one generation request end to end: resolve settings, build the
/// prompt, make a single POST and clean up the reply.
///
/// Holds no per-call state, so concurrent calls are independent.
#[derive(Clone)]
pub struct RequestOrchestrator {
    resolver: ConfigResolver,
    transport: Arc<dyn ChatTransport>,
    system_prompt: SystemPrompt,
}

impl RequestOrchestrator {
    pub fn new(
        resolver: ConfigResolver,
        transport: Arc<dyn ChatTransport>,
        system_prompt: SystemPrompt,
    ) -> Self {
        Self {
            resolver,
            transport,
            system_prompt,
        }
    }

    /// Orchestrator backed by the reqwest transport.
    pub fn with_http(resolver: ConfigResolver, system_prompt: SystemPrompt) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::new(resolver, Arc::new(transport), system_prompt))
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub async fn generate(
        &self,
        user_request: &str,
        existing_code: &str,
    ) -> Result<GeneratedArtifact, AssistError> {
        let config = self.resolver.resolve_config();
        let credential = self
            .resolver
            .resolve_credential()
            .ok_or(AssistError::CredentialMissing)?;

        let messages = build_messages(&self.system_prompt, user_request, existing_code);
        log::debug!(
            target: LOG_TARGET,
            "sending {} messages to {} (model={}, editor_context={})",
            messages.len(),
            config.endpoint_url,
            config.model_id,
            !existing_code.trim().is_empty()
        );

        let request = ChatCompletionRequest {
            model: config.model_id.clone(),
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };
        let response = self
            .transport
            .send(&config.endpoint_url, credential.expose(), &request)
            .await?;

        if !response.is_success() {
            let server_message = serde_json::from_str::<ApiErrorBody>(&response.body)
                .ok()
                .and_then(|body| body.error)
                .and_then(|detail| detail.message);
            log::debug!(target: LOG_TARGET, "endpoint answered {}", response.status);
            return Err(AssistError::api(response.status, server_message));
        }

        let content = extract_content(&response.body).ok_or(AssistError::EmptyResponse)?;
        let artifact = sanitize(&content);
        if artifact.is_empty() {
            return Err(AssistError::EmptyResponse);
        }
        Ok(artifact)
    }
}

fn extract_content(body: &str) -> Option<String> {
    let parsed: ChatCompletionResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::debug!(target: LOG_TARGET, "unreadable completion body: {err}");
            return None;
        }
    };
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
}

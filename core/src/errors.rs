use thiserror::Error;

/// Terminal outcome of a failed generation request.
///
/// Every variant renders a message that can be shown to the user verbatim.
#[derive(Debug, Error)]
pub enum AssistError {
    #[error("API key not configured. Please set your API key in the AI settings.")]
    CredentialMissing,
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("No response generated from LLM")]
    EmptyResponse,
}

impl AssistError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CredentialMissing => "AI-1001",
            Self::Network { .. } => "AI-1002",
            Self::Api { .. } => "AI-1003",
            Self::EmptyResponse => "AI-1004",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::CredentialMissing => "No API key is stored or provided by the environment.",
            Self::Network { .. } => "The completion endpoint could not be reached.",
            Self::Api { .. } => "The completion endpoint rejected the request.",
            Self::EmptyResponse => "The completion endpoint answered without usable content.",
        }
    }

    /// Build an [`AssistError::Api`] from a status and an optional server message.
    pub fn api(status: u16, server_message: Option<String>) -> Self {
        let message = server_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("API request failed: {status}"));
        Self::Api { status, message }
    }
}

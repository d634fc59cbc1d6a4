use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// System prompt compiled into the binary, used when the host supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../prompts/system_prompt.txt"
));

/// Instruction sent between the editor code and the user's request.
pub const COMPLETE_CODE_INSTRUCTION: &str =
    "If modifying, return the COMPLETE code including existing parts AND your additions. Use stack() to combine patterns if needed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Immutable system prompt shared by every request in the process.
#[derive(Debug, Clone)]
pub struct SystemPrompt(Arc<str>);

impl SystemPrompt {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Build the user turn, attaching the editor contents when there are any.
pub fn build_user_content(user_request: &str, existing_code: &str) -> String {
    if existing_code.trim().is_empty() {
        return user_request.to_string();
    }
    format!(
        "Current code in editor:\n```\n{existing_code}\n```\n\n{COMPLETE_CODE_INSTRUCTION}\n\nUser request: {user_request}"
    )
}

pub fn build_messages(
    system_prompt: &SystemPrompt,
    user_request: &str,
    existing_code: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt.as_str()),
        ChatMessage::user(build_user_content(user_request, existing_code)),
    ]
}

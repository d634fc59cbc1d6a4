pub mod config;
pub mod orchestrator;
pub mod prompt;
pub mod sanitize;
pub mod store;
pub mod transport;

pub use config::{ConfigLayer, ConfigResolver, Configuration, Credential, EnvironmentDefaults, PartialConfig};
pub use orchestrator::{GeneratedArtifact, RequestOrchestrator};
pub use prompt::{ChatMessage, ChatRole, SystemPrompt};
pub use sanitize::sanitize;
pub use store::{MemorySettingsStore, SettingsStore, SqliteSettingsStore};
pub use transport::{ChatTransport, HttpTransport};

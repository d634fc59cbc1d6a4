use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

use strudel_ai_core::agents::config::ConfigLayer;
use strudel_ai_core::agents::{
    ConfigResolver, EnvironmentDefaults, PartialConfig, RequestOrchestrator, SqliteSettingsStore,
    SystemPrompt,
};
use strudel_ai_core::assistant::{load_history, CodeAssistant, EditorHost};
use strudel_ai_core::db::{init_db, DbPool};
use strudel_ai_core::logging::recent_events;

#[derive(Parser, Debug)]
#[command(name = "strudel-ai", version, about = "Generate Strudel patterns from plain language")]
struct Cli {
    /// Replace the built-in system prompt with the contents of this file.
    #[arg(long, global = true)]
    system_prompt_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate code; with --file the file is used as editor context and rewritten.
    Generate {
        prompt: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Inspect or change persisted settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Store or clear the API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// List earlier successful generations, oldest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run an earlier generation again without contacting the endpoint.
    Replay {
        /// Position as printed by `history`.
        index: usize,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show recent entries from the event log.
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    Reset,
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    Set { value: String },
    Clear,
}

/// Editor backed by an optional file; `run` prints the program.
struct FileEditor {
    text: String,
}

impl EditorHost for FileEditor {
    fn get_text(&self) -> String {
        self.text.clone()
    }

    fn set_text(&mut self, code: &str) {
        self.text = code.to_string();
    }

    fn run(&mut self) {
        println!("{}", self.text);
    }
}

fn workspace_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("org", "Strudel", "StrudelAI") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("StrudelAI")
    }
}

fn load_system_prompt(path: Option<&PathBuf>) -> Result<SystemPrompt> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read system prompt {}", path.display()))?;
            Ok(SystemPrompt::new(text))
        }
        None => Ok(SystemPrompt::default()),
    }
}

/// Diagnostics go to stderr so generated code on stdout stays clean.
/// `RUST_LOG` overrides the default level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// User-facing notice when the persisted settings could not be used.
fn discarded_config_warning(resolver: &ConfigResolver) -> Option<String> {
    let (_, discarded) = resolver.resolve_config_with_diagnostics();
    discarded.map(|err| format!("warning: {err}; using defaults instead"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let db = init_db(workspace_dir()).context("failed to init db")?;
    let store = Arc::new(SqliteSettingsStore::new(db.clone()));
    let resolver = ConfigResolver::new(store, EnvironmentDefaults::from_env());

    match cli.command {
        Commands::Generate { prompt, file } => {
            let system_prompt = load_system_prompt(cli.system_prompt_file.as_ref())?;
            generate(resolver, system_prompt, db, &prompt, file).await
        }
        Commands::Config { action } => config(&resolver, action),
        Commands::Key { action } => {
            match action {
                KeyAction::Set { value } => resolver.persist_credential(value.trim())?,
                KeyAction::Clear => resolver.persist_credential("")?,
            }
            print_credential_status(&resolver);
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db.get()?;
            for (index, entry) in load_history(&conn, limit)?.iter().enumerate() {
                println!("[{index}] {}", entry.prompt);
            }
            Ok(())
        }
        Commands::Replay { index, file, limit } => replay(&db, resolver, index, file, limit),
        Commands::Events { limit } => {
            let conn = db.get()?;
            for event in recent_events(&conn, limit)? {
                println!(
                    "{} {:<5} {:<8} {:<12} {}",
                    event.ts,
                    event.level,
                    event.code.unwrap_or_default(),
                    event.module,
                    event.message
                );
            }
            Ok(())
        }
    }
}

async fn generate(
    resolver: ConfigResolver,
    system_prompt: SystemPrompt,
    db: DbPool,
    prompt: &str,
    file: Option<PathBuf>,
) -> Result<()> {
    let text = match &file {
        Some(path) if path.exists() => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => String::new(),
    };
    if let Some(warning) = discarded_config_warning(&resolver) {
        eprintln!("{warning}");
    }
    let orchestrator = RequestOrchestrator::with_http(resolver, system_prompt)?;
    let mut assistant = CodeAssistant::new(orchestrator, FileEditor { text }).with_event_log(db);

    if assistant.submit(prompt).await?.is_none() {
        anyhow::bail!("prompt is empty");
    }
    if let Some(path) = file {
        std::fs::write(&path, &assistant.editor().text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn replay(
    db: &DbPool,
    resolver: ConfigResolver,
    index: usize,
    file: Option<PathBuf>,
    limit: usize,
) -> Result<()> {
    let history = load_history(&*db.get()?, limit)?;
    let orchestrator = RequestOrchestrator::with_http(resolver, SystemPrompt::default())?;
    let editor = FileEditor {
        text: String::new(),
    };
    let mut assistant = CodeAssistant::new(orchestrator, editor).with_history(history);
    if assistant.replay(index).is_none() {
        anyhow::bail!("no history entry at index {index}");
    }
    if let Some(path) = file {
        std::fs::write(&path, &assistant.editor().text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn config(resolver: &ConfigResolver, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {}
        ConfigAction::Set {
            endpoint,
            model,
            temperature,
            max_tokens,
        } => resolver.persist_config(PartialConfig {
            endpoint_url: endpoint,
            model_id: model,
            temperature,
            max_tokens,
        })?,
        ConfigAction::Reset => resolver.reset_config()?,
    }

    if let Some(warning) = discarded_config_warning(resolver) {
        eprintln!("{warning}");
    }
    let config = resolver.resolve_config();
    println!("{}", serde_json::to_string_pretty(&config)?);
    print_credential_status(resolver);
    Ok(())
}

fn print_credential_status(resolver: &ConfigResolver) {
    if resolver.is_credential_from_environment_only() {
        println!("API key: using default configuration from the environment");
        return;
    }
    match resolver.credential_source() {
        Some(ConfigLayer::Persisted) => println!("API key: stored in settings"),
        Some(_) => println!("API key: provided by the environment"),
        None => println!("API key: not configured"),
    }
}

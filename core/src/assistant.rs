//! Caller-side session that connects the orchestrator to a live editor.
//!
//! The assistant reads the editor as context, writes the generated program
//! back, runs it, and keeps a per-session history of accepted generations.
//! Failed requests leave both the editor and the history untouched.

use r2d2_sqlite::rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::agents::{GeneratedArtifact, RequestOrchestrator};
use crate::db::DbPool;
use crate::errors::AssistError;
use crate::logging::log_event;

const GENERATED_CODE: &str = "AI-0200";

/// Successful generations recorded in the event log, oldest first, keeping
/// at most the `limit` most recent.
pub fn load_history(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT data FROM event_log WHERE code = ?1 AND data IS NOT NULL ORDER BY ts DESC, rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![GENERATED_CODE, limit as i64], |row| {
        row.get::<_, String>(0)
    })?;
    let mut entries = Vec::new();
    for row in rows {
        match serde_json::from_str::<HistoryEntry>(&row?) {
            Ok(entry) => entries.push(entry),
            Err(err) => log::debug!(target: "strudel_ai::history", "skipping history row: {err}"),
        }
    }
    entries.reverse();
    Ok(entries)
}

/// The host editor. The assistant never creates or tears it down.
pub trait EditorHost {
    fn get_text(&self) -> String;
    fn set_text(&mut self, code: &str);
    fn run(&mut self);
    /// Stop playback, if the host has any.
    fn stop(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prompt: String,
    pub code: String,
}

pub struct CodeAssistant<E: EditorHost> {
    orchestrator: RequestOrchestrator,
    editor: E,
    history: Vec<HistoryEntry>,
    events: Option<DbPool>,
}

impl<E: EditorHost> CodeAssistant<E> {
    pub fn new(orchestrator: RequestOrchestrator, editor: E) -> Self {
        Self {
            orchestrator,
            editor,
            history: Vec::new(),
            events: None,
        }
    }

    /// Start from entries recorded by an earlier session.
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// Record every generation outcome in the `event_log` table.
    pub fn with_event_log(mut self, pool: DbPool) -> Self {
        self.events = Some(pool);
        self
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn into_editor(self) -> E {
        self.editor
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Generate from `prompt`, apply the result to the editor and run it.
    ///
    /// Blank prompts are ignored and return `Ok(None)`.
    pub async fn submit(&mut self, prompt: &str) -> Result<Option<GeneratedArtifact>, AssistError> {
        if prompt.trim().is_empty() {
            return Ok(None);
        }
        let current = self.editor.get_text();
        match self.orchestrator.generate(prompt, &current).await {
            Ok(code) => {
                self.record_success(prompt, &code);
                self.history.push(HistoryEntry {
                    prompt: prompt.to_string(),
                    code: code.clone(),
                });
                self.editor.set_text(&code);
                self.editor.run();
                Ok(Some(code))
            }
            Err(err) => {
                self.record_failure(prompt, &err);
                Err(err)
            }
        }
    }

    /// Put a previous generation back in the editor and run it. No request
    /// is made; `None` when `index` is out of range.
    pub fn replay(&mut self, index: usize) -> Option<&HistoryEntry> {
        let code = self.history.get(index)?.code.clone();
        self.editor.set_text(&code);
        self.editor.run();
        self.history.get(index)
    }

    /// Empty the editor, stop playback and forget the session history.
    pub fn clear(&mut self) {
        self.editor.set_text("");
        self.editor.stop();
        self.history.clear();
    }

    fn record_success(&self, prompt: &str, code: &str) {
        let Some(pool) = &self.events else { return };
        if let Ok(conn) = pool.get() {
            let entry = HistoryEntry {
                prompt: prompt.to_string(),
                code: code.to_string(),
            };
            let _ = log_event(
                &conn,
                "info",
                Some(GENERATED_CODE),
                "ai.generate",
                "code generation succeeded",
                None,
                serde_json::to_value(&entry).ok(),
            );
        }
    }

    fn record_failure(&self, prompt: &str, err: &AssistError) {
        let Some(pool) = &self.events else { return };
        if let Ok(conn) = pool.get() {
            let _ = log_event(
                &conn,
                "warn",
                Some(err.code()),
                "ai.generate",
                &err.to_string(),
                Some(err.explain()),
                Some(serde_json::json!({ "prompt": prompt })),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::config::ENV_API_KEY;
    use crate::agents::orchestrator::tests::{orchestrator, StubTransport};
    use crate::db::init_in_memory;
    use crate::logging::recent_events;

    #[derive(Default)]
    struct FakeEditor {
        text: String,
        runs: usize,
        stops: usize,
    }

    impl EditorHost for FakeEditor {
        fn get_text(&self) -> String {
            self.text.clone()
        }

        fn set_text(&mut self, code: &str) {
            self.text = code.to_string();
        }

        fn run(&mut self) {
            self.runs += 1;
        }

        fn stop(&mut self) {
            self.stops += 1;
        }
    }

    #[tokio::test]
    async fn submit_applies_runs_and_records() {
        let transport = StubTransport::completion("```\nstack(s(\"bd\"), s(\"hh*4\"))\n```");
        let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], transport.clone());
        let editor = FakeEditor {
            text: "s(\"bd\")".into(),
            ..Default::default()
        };
        let pool = init_in_memory().unwrap();
        let mut assistant = CodeAssistant::new(orchestrator, editor).with_event_log(pool.clone());

        let code = assistant.submit("add hats").await.unwrap();
        assert_eq!(code.as_deref(), Some("stack(s(\"bd\"), s(\"hh*4\"))"));
        assert_eq!(assistant.editor().text, "stack(s(\"bd\"), s(\"hh*4\"))");
        assert_eq!(assistant.editor().runs, 1);
        assert_eq!(assistant.history().len(), 1);
        assert_eq!(assistant.history()[0].prompt, "add hats");

        let captured = transport.captured();
        assert!(captured[0].request.messages[1].content.contains("s(\"bd\")"));

        let conn = pool.get().unwrap();
        let events = recent_events(&conn, 5).unwrap();
        assert_eq!(events[0].code.as_deref(), Some("AI-0200"));
    }

    #[tokio::test]
    async fn blank_prompt_is_ignored() {
        let transport = StubTransport::completion("s(\"bd\")");
        let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], transport.clone());
        let mut assistant = CodeAssistant::new(orchestrator, FakeEditor::default());

        assert_eq!(assistant.submit("   ").await.unwrap(), None);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn failure_leaves_editor_and_history_untouched() {
        let transport = StubTransport::respond(401, r#"{"error":{"message":"bad key"}}"#);
        let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], transport);
        let editor = FakeEditor {
            text: "note(\"c\")".into(),
            ..Default::default()
        };
        let pool = init_in_memory().unwrap();
        let mut assistant = CodeAssistant::new(orchestrator, editor).with_event_log(pool.clone());

        let err = assistant.submit("more bass").await.unwrap_err();
        assert_eq!(err.to_string(), "bad key");
        assert_eq!(assistant.editor().text, "note(\"c\")");
        assert_eq!(assistant.editor().runs, 0);
        assert!(assistant.history().is_empty());

        let conn = pool.get().unwrap();
        let events = recent_events(&conn, 5).unwrap();
        assert_eq!(events[0].code.as_deref(), Some("AI-1003"));
        assert_eq!(events[0].message, "bad key");
    }

    #[tokio::test]
    async fn replay_restores_entry_without_request() {
        let transport = StubTransport::completion("s(\"bd*4\")");
        let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], transport.clone());
        let history = vec![HistoryEntry {
            prompt: "hats".into(),
            code: "s(\"hh*8\")".into(),
        }];
        let mut assistant =
            CodeAssistant::new(orchestrator, FakeEditor::default()).with_history(history);

        assistant.submit("kick").await.unwrap();
        assert_eq!(assistant.editor().runs, 1);

        let entry = assistant.replay(0).cloned().unwrap();
        assert_eq!(entry.code, "s(\"hh*8\")");
        assert_eq!(assistant.editor().text, "s(\"hh*8\")");
        assert_eq!(assistant.editor().runs, 2);
        assert_eq!(transport.calls(), 1);

        assert!(assistant.replay(2).is_none());
        assert_eq!(assistant.editor().text, "s(\"hh*8\")");
        assert_eq!(assistant.editor().runs, 2);
    }

    #[tokio::test]
    async fn history_survives_through_event_log() {
        let pool = init_in_memory().unwrap();
        for (prompt, code) in [("kick", "s(\"bd\")"), ("snare", "s(\"~ sd\")")] {
            let transport = StubTransport::completion(code);
            let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], transport);
            let mut assistant =
                CodeAssistant::new(orchestrator, FakeEditor::default()).with_event_log(pool.clone());
            assistant.submit(prompt).await.unwrap();
        }
        let failing = StubTransport::respond(500, "");
        let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], failing);
        let mut assistant =
            CodeAssistant::new(orchestrator, FakeEditor::default()).with_event_log(pool.clone());
        assert!(assistant.submit("hats").await.is_err());

        let conn = pool.get().unwrap();
        let history = load_history(&conn, 10).unwrap();
        assert_eq!(
            history,
            vec![
                HistoryEntry { prompt: "kick".into(), code: "s(\"bd\")".into() },
                HistoryEntry { prompt: "snare".into(), code: "s(\"~ sd\")".into() },
            ]
        );
        assert_eq!(load_history(&conn, 1).unwrap()[0].prompt, "snare");
    }

    #[tokio::test]
    async fn clear_resets_editor_and_history() {
        let transport = StubTransport::completion("s(\"bd\")");
        let (orchestrator, _) = orchestrator(&[(ENV_API_KEY, "sk-test")], transport);
        let mut assistant = CodeAssistant::new(orchestrator, FakeEditor::default());

        assistant.submit("kick").await.unwrap();
        assistant.clear();
        assert!(assistant.history().is_empty());
        let editor = assistant.into_editor();
        assert_eq!(editor.text, "");
        assert_eq!(editor.stops, 1);
    }
}

//! Core library for the Strudel AI code assistant.
//!
//! A natural-language request plus the current editor contents becomes one
//! call to an OpenAI-compatible chat completion endpoint, and the reply
//! becomes clean, directly executable Strudel code.
//! - [`agents`] resolves settings, builds prompts, talks to the endpoint and
//!   sanitizes replies.
//! - [`assistant`] drives an injected editor from a generation session.
//! - [`db`] initialises the SQLite database and applies migrations.
//! - [`errors`] keeps the generation error catalogue with stable codes.
//! - [`logging`] writes structured diagnostics to the event log table.

pub mod agents;
pub mod assistant;
pub mod db;
pub mod errors;
pub mod logging;

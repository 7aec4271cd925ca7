//! GameSession - the public entry point for running a story.
//!
//! Wires the file-backed world store and chronicle to the LLM collaborators
//! and exposes turn processing plus a few read-only views for front ends.

use crate::agents::{llm_collaborators, WorldDescriberAgent};
use crate::chronicle::{ChronicleError, ChronicleManager, TextFileChronicle};
use crate::collaborators::{call_with_timeout, CollaboratorError, WorldDescriber};
use crate::orchestrator::{TurnOrchestrator, TurnResult, TurnSettings};
use crate::persist::{JsonFileStore, StateStore, StoreError};
use crate::world::WorldState;
use chat::Chat;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("LLM client error: {0}")]
    Chat(#[from] chat::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Chronicle error: {0}")]
    Chronicle(#[from] ChronicleError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// World document location.
    pub state_path: PathBuf,

    /// Chronicle file location.
    pub chronicle_path: PathBuf,

    /// Condense the chronicle once it exceeds this many words.
    pub chronicle_word_limit: usize,

    /// Narrative drafts tried before falling back.
    pub max_narrative_attempts: u32,

    /// Deadline for each collaborator call.
    pub call_timeout: Duration,

    /// OpenAI-compatible endpoint root.
    pub base_url: String,

    pub api_key: String,

    pub model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("state.json"),
            chronicle_path: PathBuf::from("chronology.txt"),
            chronicle_word_limit: 6000,
            max_narrative_attempts: 3,
            call_timeout: Duration::from_secs(120),
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: "not-needed".to_string(),
            model: "local-model".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables.
    ///
    /// Reads `ROLEPLAY_STATE_PATH`, `ROLEPLAY_CHRONICLE_PATH`,
    /// `ROLEPLAY_WORD_LIMIT`, `ROLEPLAY_MAX_ATTEMPTS`, `ROLEPLAY_TIMEOUT_SECS`,
    /// `OPENAI_BASE_URL`, `OPENAI_API_KEY` and `ROLEPLAY_MODEL`.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SessionError> {
        let mut config = Self::default();
        if let Some(path) = lookup("ROLEPLAY_STATE_PATH") {
            config.state_path = path.into();
        }
        if let Some(path) = lookup("ROLEPLAY_CHRONICLE_PATH") {
            config.chronicle_path = path.into();
        }
        if let Some(limit) = parse_var(&lookup, "ROLEPLAY_WORD_LIMIT")? {
            config.chronicle_word_limit = limit;
        }
        if let Some(attempts) = parse_var(&lookup, "ROLEPLAY_MAX_ATTEMPTS")? {
            config.max_narrative_attempts = attempts;
        }
        if let Some(secs) = parse_var(&lookup, "ROLEPLAY_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            config.api_key = key;
        }
        if let Some(model) = lookup("ROLEPLAY_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn with_chronicle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chronicle_path = path.into();
        self
    }

    pub fn with_word_limit(mut self, words: usize) -> Self {
        self.chronicle_word_limit = words;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_narrative_attempts = attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Turn tuning derived from this config.
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            max_narrative_attempts: self.max_narrative_attempts,
            chronicle_word_limit: self.chronicle_word_limit,
            call_timeout: self.call_timeout,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, SessionError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SessionError::Config(format!("{key} is not a valid number: {raw}"))),
    }
}

/// A running story.
pub struct GameSession {
    orchestrator: TurnOrchestrator,
    describer: Arc<dyn WorldDescriber>,
}

impl GameSession {
    /// Create a session backed by files and an OpenAI-compatible endpoint.
    ///
    /// The world document must already exist at `config.state_path`.
    pub async fn new(config: EngineConfig) -> Result<Self, SessionError> {
        let client = Chat::with_timeout(&config.base_url, &config.api_key, config.call_timeout)?
            .with_model(&config.model);

        let store = Arc::new(JsonFileStore::new(&config.state_path));
        // Fail early on a missing or invalid world.
        let world = store.load().await?;
        tracing::info!(
            path = %config.state_path.display(),
            characters = world.characters.len(),
            "World loaded"
        );

        let chronicle = ChronicleManager::new(Arc::new(TextFileChronicle::new(
            &config.chronicle_path,
        )));
        let orchestrator = TurnOrchestrator::new(store, chronicle, llm_collaborators(&client))
            .with_settings(config.turn_settings());

        Ok(Self {
            orchestrator,
            describer: Arc::new(WorldDescriberAgent::new(client)),
        })
    }

    /// Create a session from prebuilt parts.
    pub fn with_parts(orchestrator: TurnOrchestrator, describer: Arc<dyn WorldDescriber>) -> Self {
        Self {
            orchestrator,
            describer,
        }
    }

    /// Play one turn. Failures are reported in the result, never raised.
    pub async fn play(&self, acting: &str, input: &str) -> TurnResult {
        match self.orchestrator.process_turn(acting, input).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Turn failed");
                TurnResult::failed(&e)
            }
        }
    }

    /// The current world.
    pub async fn world(&self) -> Result<WorldState, SessionError> {
        Ok(self.orchestrator.store().load().await?)
    }

    /// Names of all characters in the world.
    pub async fn characters(&self) -> Result<Vec<String>, SessionError> {
        Ok(self
            .world()
            .await?
            .character_names()
            .map(str::to_string)
            .collect())
    }

    /// Chronicle entries, oldest first.
    pub async fn chronicle(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.orchestrator.chronicle().entries().await?)
    }

    /// Clear the chronicle to start a new story in the same world.
    pub async fn reset_chronicle(&self) -> Result<(), SessionError> {
        Ok(self.orchestrator.chronicle().reset().await?)
    }

    /// Human-readable description of the current world.
    pub async fn describe_world(&self) -> Result<String, SessionError> {
        let world = self.world().await?;
        let timeout = self.orchestrator.settings().call_timeout;
        Ok(call_with_timeout(timeout, self.describer.describe(&world)).await?)
    }

    pub fn orchestrator(&self) -> &TurnOrchestrator {
        &self.orchestrator
    }
}

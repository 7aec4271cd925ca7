//! Turn-based two-character story engine driven by LLM collaborators.
//!
//! This crate provides:
//! - A typed world document with deep-merge patches
//! - Atomic file storage for the world and a running chronicle
//! - A seven-stage turn pipeline with a draft-and-verify narrative loop
//! - LLM-backed collaborators over any OpenAI-compatible endpoint
//!
//! # Quick Start
//!
//! ```ignore
//! use roleplay_core::{EngineConfig, GameSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_env()?.with_state_path("state.json");
//!     let session = GameSession::new(config).await?;
//!
//!     let result = session.play("Sveta", "I knock on the door").await;
//!     println!("{}", result.narrative);
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod chronicle;
pub mod collaborators;
pub mod narrative;
pub mod orchestrator;
pub mod patch;
pub mod persist;
pub mod session;
pub mod testing;
pub mod world;

// Primary public API
pub use chronicle::{ChronicleManager, Compaction, TextFileChronicle};
pub use collaborators::{CollaboratorError, Collaborators, Consequence, Verdict};
pub use narrative::{NarrativeLoop, NarrativeOutcome};
pub use orchestrator::{TurnError, TurnOrchestrator, TurnResult, TurnSettings, TurnStage};
pub use patch::{merge, Patch};
pub use persist::{resolve_counterpart, JsonFileStore, StateStore, StoreError};
pub use session::{EngineConfig, GameSession, SessionError};
pub use testing::{MockCollaborators, TestHarness};
pub use world::{Character, SchemaError, WorldState};

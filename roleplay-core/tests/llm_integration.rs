//! Integration tests that call a real OpenAI-compatible endpoint.
//!
//! These tests require OPENAI_BASE_URL to be set (via .env file or environment),
//! for example `http://localhost:1234/v1` for a local LM Studio server.
//! Run with: `cargo test -p roleplay-core --test llm_integration -- --ignored --nocapture`
//!
//! These are marked #[ignore] by default to avoid:
//! - Test failures when no model server is running
//! - Slow test runs (each turn makes at least six model calls)

use chat::Chat;
use roleplay_core::agents::{ConsequenceAgent, StoryVerifierAgent};
use roleplay_core::collaborators::{ConsequenceEngine, Verifier};
use roleplay_core::testing::sample_world_json;
use roleplay_core::{EngineConfig, GameSession, WorldState};
use tempfile::TempDir;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if an endpoint is configured
fn has_endpoint() -> bool {
    std::env::var("OPENAI_BASE_URL").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_consequence_agent_returns_valid_patch() {
    setup();
    if !has_endpoint() {
        eprintln!("Skipping test: OPENAI_BASE_URL not set");
        return;
    }

    let client = Chat::from_env().expect("Failed to create client");
    let agent = ConsequenceAgent::new(client);
    let world = WorldState::from_value(sample_world_json()).expect("valid world");

    let consequence = agent
        .consequences(&world, "put the mug on the floor", "Misha")
        .await
        .expect("agent should respond with JSON");

    println!("Patch: {}", consequence.patch.as_value());
    println!("Actions: {:?}", consequence.completed_actions);

    // Whatever the model decided, it must still be a valid world.
    world
        .apply(&consequence.patch)
        .expect("patch should keep the world valid");
}

#[tokio::test]
#[ignore]
async fn test_verifier_rejects_missing_action() {
    setup();
    if !has_endpoint() {
        eprintln!("Skipping test: OPENAI_BASE_URL not set");
        return;
    }

    let client = Chat::from_env().expect("Failed to create client");
    let verifier = StoryVerifierAgent::new(client);

    let verdict = verifier
        .verify(
            &[
                "Misha: stood up".to_string(),
                "Misha: opened the window".to_string(),
            ],
            "I stayed on the sofa, staring at my mug.",
        )
        .await
        .expect("verifier should respond");

    println!("Verdict: {verdict:?}");
    assert!(!verdict.pass, "a passage missing both actions should fail");
}

#[tokio::test]
#[ignore]
async fn test_full_session_turn() {
    setup();
    if !has_endpoint() {
        eprintln!("Skipping test: OPENAI_BASE_URL not set");
        return;
    }

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let state_path = temp_dir.path().join("state.json");
    std::fs::write(&state_path, sample_world_json().to_string()).expect("write world");

    let config = EngineConfig::from_env()
        .expect("valid config")
        .with_state_path(&state_path)
        .with_chronicle_path(temp_dir.path().join("chronology.txt"));
    let session = GameSession::new(config).await.expect("session starts");

    let result = session.play("Sveta", "I sit down next to Misha").await;

    println!("Narrative: {}", result.narrative);
    println!("Error: {:?}", result.error_message);
    assert!(result.success, "turn should succeed");
    assert!(!result.narrative.is_empty());
    assert_eq!(session.chronicle().await.expect("chronicle").len(), 1);
}

//! LLM-backed collaborators.
//!
//! Every agent talks to an OpenAI-compatible endpoint through [`chat::Chat`].
//! System prompts live in `prompts/*.txt`; `{actor}`-style placeholders are
//! filled in per call.

mod character;
mod chronicler;
mod consequence;
mod describer;
mod json;
mod narrator;

pub use character::{ActionSelectorAgent, MotivationAgent};
pub use chronicler::ChroniclerAgent;
pub use consequence::ConsequenceAgent;
pub use describer::WorldDescriberAgent;
pub use narrator::{StoryVerifierAgent, StoryWriterAgent};

use crate::collaborators::{CollaboratorError, Collaborators};
use chat::{Chat, Message, Request};
use std::sync::Arc;
use tracing::debug;

/// Build the full collaborator set on one client.
pub fn llm_collaborators(client: &Chat) -> Collaborators {
    Collaborators {
        consequences: Arc::new(ConsequenceAgent::new(client.clone())),
        planner: Arc::new(ActionSelectorAgent::new(client.clone())),
        motivation: Arc::new(MotivationAgent::new(client.clone())),
        writer: Arc::new(StoryWriterAgent::new(client.clone())),
        verifier: Arc::new(StoryVerifierAgent::new(client.clone())),
        summarizer: Arc::new(ChroniclerAgent::new(client.clone())),
    }
}

/// Send one system + user exchange and return the trimmed reply.
async fn ask(
    client: &Chat,
    agent: &'static str,
    system: String,
    prompt: String,
    configure: impl FnOnce(Request) -> Request,
) -> Result<String, CollaboratorError> {
    debug!(agent, %prompt, "Agent prompt");
    let request = configure(Request::new(vec![Message::user(prompt)]).with_system(system));
    let response = client.complete(request).await?;
    let text = response.text().to_string();
    debug!(agent, response = %text, "Agent response");
    Ok(text)
}

/// Reject blank replies from agents that must say something.
fn non_empty(agent: &str, text: String) -> Result<String, CollaboratorError> {
    if text.trim().is_empty() {
        Err(CollaboratorError::Malformed(format!("{agent} returned an empty reply")))
    } else {
        Ok(text)
    }
}

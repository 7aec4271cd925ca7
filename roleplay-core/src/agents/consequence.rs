use super::ask;
use super::json::extract_json;
use crate::collaborators::{CollaboratorError, Consequence, ConsequenceEngine};
use crate::patch::Patch;
use crate::world::WorldState;
use async_trait::async_trait;
use chat::Chat;
use serde::Deserialize;
use serde_json::Value;

const AGENT: &str = "consequence";

/// Resolves an action into a state patch and the list of things that happened.
pub struct ConsequenceAgent {
    client: Chat,
}

impl ConsequenceAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ConsequenceReply {
    #[serde(default)]
    state_changes: Value,
    #[serde(default)]
    completed_actions: Vec<String>,
}

#[async_trait]
impl ConsequenceEngine for ConsequenceAgent {
    async fn consequences(
        &self,
        state: &WorldState,
        action: &str,
        actor: &str,
    ) -> Result<Consequence, CollaboratorError> {
        let system = include_str!("prompts/consequences.txt").replace("{actor}", actor);
        let prompt = format!(
            "## World document\n{}\n\n## Action by {actor}\n{action}\n\n\
             Resolve this action for {actor} and reply with the JSON object.",
            state.to_pretty_json().map_err(|e| CollaboratorError::Failed(e.to_string()))?
        );

        let text = ask(&self.client, AGENT, system, prompt, |r| r.with_temperature(0.0)).await?;
        parse_consequence(&text)
    }
}

pub(crate) fn parse_consequence(text: &str) -> Result<Consequence, CollaboratorError> {
    let json = extract_json(text);
    let reply: ConsequenceReply = serde_json::from_str(&json)
        .map_err(|e| CollaboratorError::Malformed(format!("{e}: {json}")))?;

    let patch = Patch::from_value(reply.state_changes).ok_or_else(|| {
        CollaboratorError::Malformed("state_changes is not a JSON object".to_string())
    })?;
    let completed_actions = reply
        .completed_actions
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    Ok(Consequence {
        patch,
        completed_actions,
    })
}

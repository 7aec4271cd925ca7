//! In-character agents: choosing the counterpart's action and explaining it.

use super::{ask, non_empty};
use crate::collaborators::{
    ActionPlanner, CollaboratorError, MotivationRequest, MotivationWriter, PlanRequest,
};
use async_trait::async_trait;
use chat::Chat;

/// Picks the counterpart's next action from the scene, the snapshot and the
/// other character's latest move.
pub struct ActionSelectorAgent {
    client: Chat,
}

impl ActionSelectorAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionPlanner for ActionSelectorAgent {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<String, CollaboratorError> {
        let goal = request
            .state
            .character(request.actor)
            .map(|c| c.goal.as_str())
            .unwrap_or("none");

        let system = include_str!("prompts/planner.txt")
            .replace("{actor}", request.actor)
            .replace("{last_action}", request.last_actor_action);
        let prompt = format!(
            "## Story so far\n{tail}\n\n## Scene\n{scene}\n\n## Characters\n{snapshot}\n\n\
             ## What the other character just did\n\"{user_action}\"\n\n\
             ## Your goal\n{goal}\n\n## Your previous action\n{last}\n\n\
             State your next action as a short phrase.",
            tail = request.chronicle_tail,
            scene = request.state.scene_context(),
            snapshot = request.state.characters_snapshot(),
            user_action = request.user_action,
            last = request.last_actor_action,
        );

        let text = ask(&self.client, "action_selector", system, prompt, |r| {
            r.with_temperature(0.7)
        })
        .await?;
        non_empty("action_selector", clean_action(&text))
    }
}

/// Explains why the counterpart chose its action.
pub struct MotivationAgent {
    client: Chat,
}

impl MotivationAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MotivationWriter for MotivationAgent {
    async fn motivate(&self, request: MotivationRequest<'_>) -> Result<String, CollaboratorError> {
        let goal = request
            .state
            .character(request.actor)
            .map(|c| c.goal.as_str())
            .unwrap_or("No current goal.");
        let world = request
            .state
            .to_pretty_json()
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        let system = include_str!("prompts/motivation.txt").replace("{actor}", request.actor);
        let prompt = format!(
            "## World document\n{world}\n\n## What the other character just did\n\"{}\"\n\n\
             ## Your goal\n{goal}\n\n## The action you are about to take\n{}\n\n\
             Explain your motivation.",
            request.user_action, request.planned_action,
        );

        let text = ask(&self.client, "motivation", system, prompt, |r| {
            r.with_temperature(0.7)
        })
        .await?;
        non_empty("motivation", text)
    }
}

/// Models sometimes wrap the phrase in quotes or add a trailing period.
fn clean_action(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim_end_matches('.')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_action() {
        assert_eq!(clean_action("\"stand up from the sofa.\"\n"), "stand up from the sofa");
        assert_eq!(clean_action("\n\n  wave back\nextra line"), "wave back");
        assert_eq!(clean_action("   "), "");
    }
}

use super::{ask, non_empty};
use crate::collaborators::{CollaboratorError, WorldDescriber};
use crate::world::WorldState;
use async_trait::async_trait;
use chat::Chat;

/// Turns the world document into a readable description.
pub struct WorldDescriberAgent {
    client: Chat,
}

impl WorldDescriberAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorldDescriber for WorldDescriberAgent {
    async fn describe(&self, state: &WorldState) -> Result<String, CollaboratorError> {
        let world = state
            .to_pretty_json()
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
        let prompt = format!(
            "## World document\n{world}\n\n\
             Describe this world. Use the Wearing: and Holding: headings for each character."
        );
        let system = include_str!("prompts/describer.txt").to_string();

        let text = ask(&self.client, "world_describer", system, prompt, |r| {
            r.with_temperature(0.0)
        })
        .await?;
        non_empty("world_describer", text)
    }
}

use super::json::extract_json;
use super::{ask, non_empty};
use crate::collaborators::{
    CollaboratorError, DraftRequest, NarrativeWriter, Verdict, Verifier,
};
use async_trait::async_trait;
use chat::Chat;
use serde::Deserialize;

/// Writes the first-person passage for a turn.
pub struct StoryWriterAgent {
    client: Chat,
}

impl StoryWriterAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NarrativeWriter for StoryWriterAgent {
    async fn draft(&self, request: DraftRequest<'_>) -> Result<String, CollaboratorError> {
        let world = request
            .state
            .to_pretty_json()
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        let mut prompt = String::new();
        if let Some(reason) = request.feedback {
            prompt.push_str(&format!(
                "## Revision required\nYour previous passage was rejected. Fix this problem:\n{reason}\n\n"
            ));
        }
        prompt.push_str(&format!(
            "## Previous chronicle entry\n{}\n\n## World document\n{world}\n\n\
             ## What {} did\n{}\n\n## Your motivation\n{}\n\n\
             ## Script (completed actions, in order)\n{}\n\n\
             Write the passage. Depict every scripted action and add no new significant actions.",
            request.chronicle_tail,
            request.user_character,
            request.user_action,
            request.motivation,
            request.completed_actions.join("\n"),
        ));

        let system = include_str!("prompts/writer.txt")
            .replace("{actor}", request.actor)
            .replace("{user_character}", request.user_character);

        let text = ask(&self.client, "story_writer", system, prompt, |r| {
            r.with_temperature(0.8).with_repetition_penalty(1.1)
        })
        .await?;
        non_empty("story_writer", text)
    }
}

/// Checks that a passage depicts exactly the scripted actions.
pub struct StoryVerifierAgent {
    client: Chat,
}

impl StoryVerifierAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct VerdictReply {
    result: String,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Verifier for StoryVerifierAgent {
    async fn verify(
        &self,
        completed_actions: &[String],
        narrative: &str,
    ) -> Result<Verdict, CollaboratorError> {
        let prompt = format!(
            "## Script\n{}\n\n## Passage\n{narrative}\n\n\
             Check the passage against the script and reply with the JSON verdict.",
            completed_actions.join("\n")
        );
        let system = include_str!("prompts/verifier.txt").to_string();

        let text = ask(&self.client, "story_verifier", system, prompt, |r| {
            r.with_temperature(0.0)
        })
        .await?;
        parse_verdict(&text)
    }
}

pub(crate) fn parse_verdict(text: &str) -> Result<Verdict, CollaboratorError> {
    let json = extract_json(text);
    let reply: VerdictReply = serde_json::from_str(&json)
        .map_err(|e| CollaboratorError::Malformed(format!("{e}: {json}")))?;

    if reply.result.trim().eq_ignore_ascii_case("PASS") {
        Ok(Verdict::pass())
    } else {
        let reason = reply
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Unknown reason".to_string());
        Ok(Verdict::fail(reason))
    }
}

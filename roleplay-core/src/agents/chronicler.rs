use super::{ask, non_empty};
use crate::collaborators::{CollaboratorError, Summarizer, TurnSummaryRequest};
use async_trait::async_trait;
use chat::Chat;

/// Writes chronicle entries and condenses the chronicle when it grows.
pub struct ChroniclerAgent {
    client: Chat,
}

impl ChroniclerAgent {
    pub fn new(client: Chat) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for ChroniclerAgent {
    async fn summarize_turn(
        &self,
        request: TurnSummaryRequest<'_>,
    ) -> Result<String, CollaboratorError> {
        let prompt = format!(
            "Summarize this turn.\n\n\
             - {acting} did: \"{input}\"\n\
             - {counterpart}'s motivation: \"{motivation}\"\n\
             - {counterpart}'s passage: \"{narrative}\"",
            acting = request.acting,
            input = request.acting_input,
            counterpart = request.counterpart,
            motivation = request.motivation,
            narrative = request.narrative.trim(),
        );
        let system = include_str!("prompts/chronicler.txt").to_string();

        let text = ask(&self.client, "chronicler", system, prompt, |r| {
            r.with_temperature(0.2)
        })
        .await?;
        non_empty("chronicler", text)
    }

    async fn compact(&self, log_text: &str) -> Result<String, CollaboratorError> {
        let system = include_str!("prompts/compactor.txt").to_string();
        ask(&self.client, "compactor", system, log_text.to_string(), |r| {
            r.with_temperature(0.3)
        })
        .await
    }
}

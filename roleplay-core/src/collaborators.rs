//! Capabilities the turn pipeline delegates to text generation.
//!
//! Each trait is one sub-task. The pipeline never inspects generated prose
//! itself; it only moves the results between stages. LLM-backed
//! implementations live in [`crate::agents`], scripted ones in
//! [`crate::testing`].

use crate::patch::Patch;
use crate::world::WorldState;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A collaborator call failed or returned something unusable.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] chat::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

/// Run one collaborator call under a deadline.
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CollaboratorError::Timeout(limit))?
}

/// What an action does to the world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consequence {
    /// Changes to apply, in patch form.
    pub patch: Patch,
    /// Atomic actions that actually happened, in order.
    pub completed_actions: Vec<String>,
}

impl Consequence {
    /// No state change and nothing happened.
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.completed_actions.is_empty()
    }
}

/// Input for choosing the counterpart's next action.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub state: &'a WorldState,
    pub actor: &'a str,
    pub user_action: &'a str,
    pub last_actor_action: &'a str,
    pub chronicle_tail: &'a str,
}

/// Input for explaining a planned action.
#[derive(Debug, Clone, Copy)]
pub struct MotivationRequest<'a> {
    pub state: &'a WorldState,
    pub actor: &'a str,
    pub planned_action: &'a str,
    pub user_action: &'a str,
}

/// Input for drafting the narrative of a turn.
#[derive(Debug, Clone, Copy)]
pub struct DraftRequest<'a> {
    pub state: &'a WorldState,
    /// The character whose actions are narrated.
    pub actor: &'a str,
    /// The character who acted first this turn.
    pub user_character: &'a str,
    pub completed_actions: &'a [String],
    pub motivation: &'a str,
    pub user_action: &'a str,
    pub chronicle_tail: &'a str,
    /// Why the previous draft was rejected, if it was.
    pub feedback: Option<&'a str>,
}

/// Input for summarizing one committed turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnSummaryRequest<'a> {
    pub acting: &'a str,
    pub acting_input: &'a str,
    pub counterpart: &'a str,
    pub narrative: &'a str,
    pub motivation: &'a str,
}

/// A verifier's judgment of one draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub pass: bool,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            pass: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait ConsequenceEngine: Send + Sync {
    /// Derive the effect of `action` performed by `actor`.
    async fn consequences(
        &self,
        state: &WorldState,
        action: &str,
        actor: &str,
    ) -> Result<Consequence, CollaboratorError>;
}

#[async_trait]
pub trait ActionPlanner: Send + Sync {
    /// Decide the actor's next action as a short free-text phrase.
    async fn plan(&self, request: PlanRequest<'_>) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait MotivationWriter: Send + Sync {
    async fn motivate(&self, request: MotivationRequest<'_>) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait NarrativeWriter: Send + Sync {
    async fn draft(&self, request: DraftRequest<'_>) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Judge whether `narrative` covers every scripted action and nothing else.
    async fn verify(
        &self,
        completed_actions: &[String],
        narrative: &str,
    ) -> Result<Verdict, CollaboratorError>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condense one turn into a chronicle entry.
    async fn summarize_turn(
        &self,
        request: TurnSummaryRequest<'_>,
    ) -> Result<String, CollaboratorError>;

    /// Condense the whole chronicle, preserving the order of events.
    async fn compact(&self, log_text: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait WorldDescriber: Send + Sync {
    /// Human-readable description of the world.
    async fn describe(&self, state: &WorldState) -> Result<String, CollaboratorError>;
}

/// The full set of collaborators one turn needs.
#[derive(Clone)]
pub struct Collaborators {
    pub consequences: Arc<dyn ConsequenceEngine>,
    pub planner: Arc<dyn ActionPlanner>,
    pub motivation: Arc<dyn MotivationWriter>,
    pub writer: Arc<dyn NarrativeWriter>,
    pub verifier: Arc<dyn Verifier>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl Collaborators {
    /// Use one value for every capability.
    pub fn from_shared<T>(all: Arc<T>) -> Self
    where
        T: ConsequenceEngine
            + ActionPlanner
            + MotivationWriter
            + NarrativeWriter
            + Verifier
            + Summarizer
            + 'static,
    {
        Self {
            consequences: all.clone(),
            planner: all.clone(),
            motivation: all.clone(),
            writer: all.clone(),
            verifier: all.clone(),
            summarizer: all,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_with_timeout_passes_result_through() {
        let value = call_with_timeout(Duration::from_secs(1), async { Ok::<_, CollaboratorError>(7) })
            .await
            .expect("completes in time");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_call_with_timeout_expires() {
        let result: Result<(), _> = call_with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Timeout(_))));
    }

    #[test]
    fn test_verdict_constructors() {
        assert!(Verdict::pass().pass);
        let failed = Verdict::fail("missing action");
        assert!(!failed.pass);
        assert_eq!(failed.reason.as_deref(), Some("missing action"));
    }

    #[test]
    fn test_empty_consequence() {
        assert!(Consequence::default().is_empty());
        let acted = Consequence {
            patch: Patch::empty(),
            completed_actions: vec!["Misha: stood up".to_string()],
        };
        assert!(!acted.is_empty());
    }
}

//! One complete turn: the acting character's input, the counterpart's
//! reaction, the narrative, and the commit.
//!
//! Stages run in a fixed order and each one works on the snapshot the
//! previous one produced. Nothing is persisted until every stage has
//! succeeded, and then the final snapshot is committed exactly once.

use crate::chronicle::{ChronicleError, ChronicleManager};
use crate::collaborators::{
    call_with_timeout, CollaboratorError, Collaborators, Consequence, MotivationRequest,
    PlanRequest, TurnSummaryRequest,
};
use crate::narrative::{does_nothing, NarrativeContext, NarrativeLoop};
use crate::persist::{resolve_counterpart, StateStore, StoreError};
use crate::world::{SchemaError, WorldState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Used for the counterpart's last action when it has none recorded.
const NO_PREVIOUS_ACTION: &str = "has not acted yet";

/// The steps of a turn, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    ActingConsequences,
    SelectAction,
    Motivation,
    CounterpartConsequences,
    Narrative,
    Commit,
    Chronicle,
}

impl TurnStage {
    /// Position in the pipeline, starting at 1.
    pub fn number(self) -> u8 {
        match self {
            Self::ActingConsequences => 1,
            Self::SelectAction => 2,
            Self::Motivation => 3,
            Self::CounterpartConsequences => 4,
            Self::Narrative => 5,
            Self::Commit => 6,
            Self::Chronicle => 7,
        }
    }

    pub const COUNT: u8 = 7;
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ActingConsequences => "acting character consequences",
            Self::SelectAction => "counterpart action selection",
            Self::Motivation => "counterpart motivation",
            Self::CounterpartConsequences => "counterpart consequences",
            Self::Narrative => "narrative",
            Self::Commit => "commit",
            Self::Chronicle => "chronicle",
        };
        f.write_str(name)
    }
}

/// A turn that failed before committing anything.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("World document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("No counterpart for {acting}")]
    NoCounterpart { acting: String },

    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("Stage '{stage}' failed: {source}")]
    Collaborator {
        stage: TurnStage,
        #[source]
        source: CollaboratorError,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for TurnError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => Self::NotFound(path),
            StoreError::Schema(e) => Self::Schema(e),
            StoreError::NoCounterpart { acting } => Self::NoCounterpart { acting },
            StoreError::UnknownCharacter(name) => Self::UnknownCharacter(name),
            StoreError::Io(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<ChronicleError> for TurnError {
    fn from(e: ChronicleError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// What a turn produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResult {
    pub counterpart: String,
    pub motivation: String,
    pub narrative: String,
    pub completed_actions: Vec<String>,
    pub success: bool,
    /// False when the narrative is the fallback text.
    pub narrative_verified: bool,
    pub error_message: Option<String>,
}

impl TurnResult {
    /// A result describing a turn that did not happen.
    pub fn failed(error: &TurnError) -> Self {
        Self {
            counterpart: String::new(),
            motivation: String::new(),
            narrative: String::new(),
            completed_actions: Vec::new(),
            success: false,
            narrative_verified: false,
            error_message: Some(error.to_string()),
        }
    }
}

/// Tuning knobs for a turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub max_narrative_attempts: u32,
    pub chronicle_word_limit: usize,
    pub call_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            max_narrative_attempts: 3,
            chronicle_word_limit: 6000,
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Runs turns against one world and one chronicle.
///
/// Turns are serialized: a second call to [`process_turn`](Self::process_turn)
/// waits until the first has committed or failed.
pub struct TurnOrchestrator {
    store: Arc<dyn StateStore>,
    chronicle: ChronicleManager,
    collaborators: Collaborators,
    settings: TurnSettings,
    turn_lock: Mutex<()>,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        chronicle: ChronicleManager,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            store,
            chronicle,
            collaborators,
            settings: TurnSettings::default(),
            turn_lock: Mutex::new(()),
        }
    }

    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.chronicle = self.chronicle.with_call_timeout(settings.call_timeout);
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn chronicle(&self) -> &ChronicleManager {
        &self.chronicle
    }

    /// Run one full turn for `acting`, who does `input`.
    pub async fn process_turn(&self, acting: &str, input: &str) -> Result<TurnResult, TurnError> {
        let _guard = self.turn_lock.lock().await;
        let span = tracing::info_span!("turn", id = %Uuid::new_v4().simple(), acting);
        self.run_turn(acting, input).instrument(span).await
    }

    async fn run_turn(&self, acting: &str, input: &str) -> Result<TurnResult, TurnError> {
        let state = self.store.load().await?;
        let counterpart = resolve_counterpart(&state, acting)?.to_string();
        info!(%counterpart, "Turn started");

        self.log_stage(TurnStage::ActingConsequences);
        let acting_effect = self
            .call(
                TurnStage::ActingConsequences,
                self.collaborators.consequences.consequences(&state, input, acting),
            )
            .await?;
        let after_acting = state.apply(&acting_effect.patch)?;

        let chronicle_tail = self.chronicle.tail().await?;
        let last_action = after_acting
            .character(&counterpart)
            .map(|c| c.current_action.clone())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| NO_PREVIOUS_ACTION.to_string());

        self.log_stage(TurnStage::SelectAction);
        let planned_action = self
            .call(
                TurnStage::SelectAction,
                self.collaborators.planner.plan(PlanRequest {
                    state: &after_acting,
                    actor: &counterpart,
                    user_action: input,
                    last_actor_action: &last_action,
                    chronicle_tail: &chronicle_tail,
                }),
            )
            .await?;
        info!(action = %planned_action, "Counterpart chose an action");

        self.log_stage(TurnStage::Motivation);
        let motivation = self
            .call(
                TurnStage::Motivation,
                self.collaborators.motivation.motivate(MotivationRequest {
                    state: &after_acting,
                    actor: &counterpart,
                    planned_action: &planned_action,
                    user_action: input,
                }),
            )
            .await?;

        self.log_stage(TurnStage::CounterpartConsequences);
        let counterpart_effect = self
            .call(
                TurnStage::CounterpartConsequences,
                self.collaborators.consequences.consequences(
                    &after_acting,
                    &planned_action,
                    &counterpart,
                ),
            )
            .await?;
        let after_counterpart = after_acting.apply(&counterpart_effect.patch)?;

        self.log_stage(TurnStage::Narrative);
        let (narrative, narrative_verified) = self
            .narrate(
                &after_acting,
                &counterpart,
                acting,
                &counterpart_effect,
                &motivation,
                input,
                &chronicle_tail,
            )
            .await;

        self.log_stage(TurnStage::Commit);
        self.store.commit(&after_counterpart).await?;

        self.log_stage(TurnStage::Chronicle);
        let error_message = self
            .record(acting, input, &counterpart, &narrative, &motivation)
            .await
            .err();

        info!(verified = narrative_verified, "Turn complete");
        Ok(TurnResult {
            counterpart,
            motivation,
            narrative,
            completed_actions: counterpart_effect.completed_actions,
            success: true,
            narrative_verified,
            error_message,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn narrate(
        &self,
        state: &WorldState,
        actor: &str,
        user_character: &str,
        effect: &Consequence,
        motivation: &str,
        user_action: &str,
        chronicle_tail: &str,
    ) -> (String, bool) {
        if effect.is_empty() {
            info!("Counterpart did nothing, skipping narrative generation");
            return (does_nothing(actor), true);
        }

        let context = NarrativeContext {
            state,
            actor,
            user_character,
            completed_actions: &effect.completed_actions,
            motivation,
            user_action,
            chronicle_tail,
        };
        let outcome = NarrativeLoop::new(
            self.collaborators.writer.as_ref(),
            self.collaborators.verifier.as_ref(),
        )
        .with_max_attempts(self.settings.max_narrative_attempts)
        .with_call_timeout(self.settings.call_timeout)
        .run(context)
        .await;

        let verified = outcome.is_accepted();
        (outcome.into_narrative(&effect.completed_actions), verified)
    }

    /// Post-commit bookkeeping. Failures here cannot undo the commit, so they
    /// are reported instead of propagated.
    async fn record(
        &self,
        acting: &str,
        input: &str,
        counterpart: &str,
        narrative: &str,
        motivation: &str,
    ) -> Result<(), String> {
        let request = TurnSummaryRequest {
            acting,
            acting_input: input,
            counterpart,
            narrative,
            motivation,
        };
        let summary = match call_with_timeout(
            self.settings.call_timeout,
            self.collaborators.summarizer.summarize_turn(request),
        )
        .await
        {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => fallback_summary(acting, input, counterpart),
            Err(e) => {
                warn!(error = %e, "Turn summary failed, using fallback");
                fallback_summary(acting, input, counterpart)
            }
        };

        if let Err(e) = self.chronicle.append(&summary).await {
            error!(error = %e, "Turn committed but chronicle was not updated");
            return Err(format!("chronicle not updated: {e}"));
        }

        match self
            .chronicle
            .compact_if_oversized(
                self.settings.chronicle_word_limit,
                self.collaborators.summarizer.as_ref(),
            )
            .await
        {
            Ok(outcome) => {
                tracing::debug!(?outcome, "Chronicle size checked");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Chronicle compaction failed");
                Err(format!("chronicle not condensed: {e}"))
            }
        }
    }

    async fn call<T, F>(&self, stage: TurnStage, call: F) -> Result<T, TurnError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        call_with_timeout(self.settings.call_timeout, call)
            .await
            .map_err(|source| {
                error!(%stage, error = %source, "Turn stage failed, nothing committed");
                TurnError::Collaborator { stage, source }
            })
    }

    fn log_stage(&self, stage: TurnStage) {
        info!("{}/{} {}", stage.number(), TurnStage::COUNT, stage);
    }
}

/// Chronicle entry used when the summarizer fails.
pub fn fallback_summary(acting: &str, input: &str, counterpart: &str) -> String {
    format!("{acting} did {input}. {counterpart} reacted.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_numbers_are_sequential() {
        let stages = [
            TurnStage::ActingConsequences,
            TurnStage::SelectAction,
            TurnStage::Motivation,
            TurnStage::CounterpartConsequences,
            TurnStage::Narrative,
            TurnStage::Commit,
            TurnStage::Chronicle,
        ];
        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.number() as usize, i + 1);
        }
        assert_eq!(stages.len(), TurnStage::COUNT as usize);
    }

    #[test]
    fn test_store_errors_map_to_turn_errors() {
        let err: TurnError = StoreError::UnknownCharacter("Olga".to_string()).into();
        assert!(matches!(err, TurnError::UnknownCharacter(ref n) if n == "Olga"));

        let err: TurnError = StoreError::NoCounterpart {
            acting: "Sveta".to_string(),
        }
        .into();
        assert!(matches!(err, TurnError::NoCounterpart { .. }));
    }

    #[test]
    fn test_failed_result() {
        let result = TurnResult::failed(&TurnError::UnknownCharacter("Olga".to_string()));
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Unknown character: Olga"));
    }

    #[test]
    fn test_fallback_summary() {
        assert_eq!(
            fallback_summary("Sveta", "waves", "Misha"),
            "Sveta did waves. Misha reacted."
        );
    }
}

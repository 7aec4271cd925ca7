//! Draft-and-verify loop for turn narratives.
//!
//! A draft is accepted only when the verifier agrees it covers exactly the
//! scripted actions. Rejected drafts are rewritten with the verifier's reason
//! as feedback, up to a fixed number of attempts.

use crate::collaborators::{
    call_with_timeout, CollaboratorError, DraftRequest, NarrativeWriter, Verifier,
};
use crate::world::WorldState;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Prefix of the narrative used when no draft was accepted.
pub const FALLBACK_PREFIX: &str = "(System: Story generation failed) Actions taken: ";

/// Narrative for a turn in which the counterpart did nothing at all.
pub fn does_nothing(actor: &str) -> String {
    format!("{actor} does nothing.")
}

/// Deterministic narrative built from the script itself.
pub fn fallback_narrative(completed_actions: &[String]) -> String {
    format!("{FALLBACK_PREFIX}{}", completed_actions.join(", "))
}

/// Everything the writer needs that stays fixed across attempts.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeContext<'a> {
    pub state: &'a WorldState,
    pub actor: &'a str,
    pub user_character: &'a str,
    pub completed_actions: &'a [String],
    pub motivation: &'a str,
    pub user_action: &'a str,
    pub chronicle_tail: &'a str,
}

impl<'a> NarrativeContext<'a> {
    fn draft_request(&self, feedback: Option<&'a str>) -> DraftRequest<'a> {
        DraftRequest {
            state: self.state,
            actor: self.actor,
            user_character: self.user_character,
            completed_actions: self.completed_actions,
            motivation: self.motivation,
            user_action: self.user_action,
            chronicle_tail: self.chronicle_tail,
            feedback,
        }
    }
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrativeOutcome {
    Accepted {
        narrative: String,
        attempts: u32,
    },
    Exhausted {
        last_draft: String,
        reason: String,
        attempts: u32,
    },
}

impl NarrativeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Accepted { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The narrative to show and record: the accepted draft, or the
    /// fallback built from `completed_actions`.
    pub fn into_narrative(self, completed_actions: &[String]) -> String {
        match self {
            Self::Accepted { narrative, .. } => narrative,
            Self::Exhausted { .. } => fallback_narrative(completed_actions),
        }
    }
}

/// Attempt counts are 1-based once a draft has been requested.
enum LoopState {
    Drafting {
        attempt: u32,
        feedback: Option<String>,
        last_draft: String,
    },
    Verifying {
        attempt: u32,
        draft: String,
    },
    Retry {
        attempt: u32,
        draft: String,
        reason: String,
    },
    Accepted {
        attempt: u32,
        draft: String,
    },
    Exhausted {
        attempt: u32,
        draft: String,
        reason: String,
    },
}

/// Runs the draft-and-verify state machine.
pub struct NarrativeLoop<'c> {
    writer: &'c dyn NarrativeWriter,
    verifier: &'c dyn Verifier,
    max_attempts: u32,
    call_timeout: Duration,
}

impl<'c> NarrativeLoop<'c> {
    pub fn new(writer: &'c dyn NarrativeWriter, verifier: &'c dyn Verifier) -> Self {
        Self {
            writer,
            verifier,
            max_attempts: 3,
            call_timeout: Duration::from_secs(120),
        }
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = limit;
        self
    }

    /// Drive the loop to a terminal state.
    ///
    /// Writer and verifier failures count as failed attempts; they never
    /// abort the loop.
    pub async fn run(&self, context: NarrativeContext<'_>) -> NarrativeOutcome {
        let mut state = LoopState::Drafting {
            attempt: 1,
            feedback: None,
            last_draft: String::new(),
        };

        loop {
            state = match state {
                LoopState::Drafting {
                    attempt,
                    feedback,
                    last_draft,
                } => {
                    info!(attempt, max = self.max_attempts, "Writing narrative");
                    let request = context.draft_request(feedback.as_deref());
                    match call_with_timeout(self.call_timeout, self.writer.draft(request)).await {
                        Ok(draft) => LoopState::Verifying { attempt, draft },
                        Err(e) => LoopState::Retry {
                            attempt,
                            draft: last_draft,
                            reason: format!("writer failed: {e}"),
                        },
                    }
                }
                LoopState::Verifying { attempt, draft } => {
                    let verdict = call_with_timeout(
                        self.call_timeout,
                        self.verifier.verify(context.completed_actions, &draft),
                    )
                    .await;
                    match verdict {
                        Ok(v) if v.pass => LoopState::Accepted { attempt, draft },
                        Ok(v) => LoopState::Retry {
                            attempt,
                            draft,
                            reason: v.reason.unwrap_or_else(|| "Unknown reason".to_string()),
                        },
                        Err(e) => LoopState::Retry {
                            attempt,
                            draft,
                            reason: verifier_failure(&e),
                        },
                    }
                }
                LoopState::Retry {
                    attempt,
                    draft,
                    reason,
                } => {
                    warn!(attempt, %reason, "Narrative rejected");
                    if attempt >= self.max_attempts {
                        LoopState::Exhausted {
                            attempt,
                            draft,
                            reason,
                        }
                    } else {
                        LoopState::Drafting {
                            attempt: attempt + 1,
                            feedback: Some(reason),
                            last_draft: draft,
                        }
                    }
                }
                LoopState::Accepted { attempt, draft } => {
                    debug!(attempt, "Narrative accepted");
                    return NarrativeOutcome::Accepted {
                        narrative: draft,
                        attempts: attempt,
                    };
                }
                LoopState::Exhausted {
                    attempt,
                    draft,
                    reason,
                } => {
                    error!(attempts = attempt, "Narrative verification exhausted");
                    return NarrativeOutcome::Exhausted {
                        last_draft: draft,
                        reason,
                        attempts: attempt,
                    };
                }
            };
        }
    }
}

fn verifier_failure(e: &CollaboratorError) -> String {
    match e {
        CollaboratorError::Malformed(_) => "Verifier failed to return valid JSON.".to_string(),
        other => format!("verifier failed: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Verdict;
    use crate::testing::{sample_world_json, MockCollaborators};

    fn script() -> Vec<String> {
        vec![
            "Misha: stood up".to_string(),
            "Misha: put the mug on the table".to_string(),
        ]
    }

    async fn run_loop(mocks: &MockCollaborators, max_attempts: u32) -> NarrativeOutcome {
        let world = WorldState::from_value(sample_world_json()).expect("fixture is valid");
        let script = script();
        let context = NarrativeContext {
            state: &world,
            actor: "Misha",
            user_character: "Sveta",
            completed_actions: &script,
            motivation: "He wants to greet her",
            user_action: "Sveta waves",
            chronicle_tail: "Sveta came in.",
        };
        NarrativeLoop::new(mocks, mocks)
            .with_max_attempts(max_attempts)
            .run(context)
            .await
    }

    #[tokio::test]
    async fn test_accepts_first_passing_draft() {
        let mocks = MockCollaborators::new()
            .with_draft("Misha stood and set the mug down.")
            .with_verdict(Verdict::pass());

        let outcome = run_loop(&mocks, 3).await;

        assert_eq!(
            outcome,
            NarrativeOutcome::Accepted {
                narrative: "Misha stood and set the mug down.".to_string(),
                attempts: 1
            }
        );
        assert_eq!(mocks.calls().draft, 1);
        assert_eq!(mocks.calls().verify, 1);
    }

    #[tokio::test]
    async fn test_retry_passes_feedback() {
        let mocks = MockCollaborators::new()
            .with_draft("Misha stood.")
            .with_verdict(Verdict::fail("mug action missing"))
            .with_draft("Misha stood and put the mug on the table.")
            .with_verdict(Verdict::pass());

        let outcome = run_loop(&mocks, 3).await;

        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(
            mocks.draft_feedback(),
            vec![None, Some("mug action missing".to_string())]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_makes_exactly_max_attempts() {
        let mocks = MockCollaborators::new()
            .with_draft("Misha stood.")
            .with_verdict(Verdict::fail("extra action"))
            .with_draft("Misha stood and danced.")
            .with_verdict(Verdict::fail("extra action"))
            .with_draft("Misha stood and sang.")
            .with_verdict(Verdict::fail("still extra"));

        let outcome = run_loop(&mocks, 3).await;

        assert!(matches!(
            &outcome,
            NarrativeOutcome::Exhausted { attempts: 3, last_draft, reason }
                if last_draft == "Misha stood and sang." && reason == "still extra"
        ));
        assert_eq!(mocks.calls().draft, 3);
        assert_eq!(mocks.calls().verify, 3);

        let narrative = outcome.into_narrative(&script());
        assert!(narrative.starts_with(FALLBACK_PREFIX));
        assert!(narrative.contains("Misha: stood up"));
        assert!(narrative.contains("Misha: put the mug on the table"));
    }

    #[tokio::test]
    async fn test_writer_failure_counts_as_attempt() {
        let mocks = MockCollaborators::new()
            .failing_draft("connection reset")
            .with_draft("Misha stood and put the mug on the table.")
            .with_verdict(Verdict::pass());

        let outcome = run_loop(&mocks, 3).await;

        assert_eq!(outcome.attempts(), 2);
        assert_eq!(mocks.calls().verify, 1);
    }

    #[tokio::test]
    async fn test_malformed_verdict_counts_as_failure() {
        let mocks = MockCollaborators::new().failing_verify_malformed("not json");

        let outcome = run_loop(&mocks, 1).await;

        assert!(matches!(
            outcome,
            NarrativeOutcome::Exhausted { attempts: 1, ref reason, .. }
                if reason == "Verifier failed to return valid JSON."
        ));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let mocks = MockCollaborators::new();

        let outcome = run_loop(&mocks, 0).await;

        assert_eq!(outcome.attempts(), 1);
        assert_eq!(mocks.calls().draft, 1);
    }

    #[test]
    fn test_fallback_narrative() {
        assert_eq!(
            fallback_narrative(&script()),
            "(System: Story generation failed) Actions taken: Misha: stood up, Misha: put the mug on the table"
        );
        assert_eq!(does_nothing("Misha"), "Misha does nothing.");
    }
}

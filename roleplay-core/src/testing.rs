//! Testing utilities for turn processing.
//!
//! This module provides tools for deterministic tests without an LLM:
//! - `MockCollaborators` with scripted replies and call recording
//! - `MemoryStateStore` and `MemoryChronicle` in place of files
//! - `TestHarness` wiring them into a `TurnOrchestrator`
//! - Assertion helpers for checking the committed world

use crate::chronicle::{ChronicleError, ChronicleManager, ChronicleStore};
use crate::collaborators::{
    ActionPlanner, CollaboratorError, Collaborators, Consequence, ConsequenceEngine, DraftRequest,
    MotivationRequest, MotivationWriter, NarrativeWriter, PlanRequest, Summarizer,
    TurnSummaryRequest, Verdict, Verifier, WorldDescriber,
};
use crate::orchestrator::{TurnError, TurnOrchestrator, TurnResult, TurnSettings};
use crate::patch::Patch;
use crate::persist::{StateStore, StoreError};
use crate::world::WorldState;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A small two-character living room scene: Sveta by the door, Misha on
/// the sofa holding a mug.
pub fn sample_world_json() -> Value {
    json!({
        "scene": {
            "location": "living room",
            "time": "evening",
            "description": "A dim room with a worn sofa",
            "interactive_objects": [
                {"name": "sofa", "location": "by the wall", "state": "empty"}
            ]
        },
        "characters": {
            "Sveta": {
                "age": 24,
                "description": "tall, dark hair",
                "personality": "curious",
                "current_action": "standing by the door",
                "current_emotion": ["calm"],
                "goal": "find out why Misha called",
                "knowledge": [],
                "relationships": [{"target": "Misha", "type": "friend"}],
                "location_in_scene": "near the door",
                "clothing": {"torso": ["t-shirt"], "overwear": ["leather jacket"]},
                "inventory": ["phone"],
                "holding": []
            },
            "Misha": {
                "age": 26,
                "description": "short, nervous",
                "personality": "shy",
                "current_action": "sitting on the sofa",
                "current_emotion": ["anxious"],
                "goal": "confess a secret",
                "location_in_scene": "on the sofa",
                "holding": ["mug"]
            }
        }
    })
}

/// [`sample_world_json`] as a validated world.
pub fn sample_world() -> WorldState {
    WorldState::from_value(sample_world_json()).expect("sample world is valid")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a scripted call fails.
#[derive(Debug, Clone)]
enum Failure {
    Failed(String),
    Malformed(String),
    /// Never answers; only a timeout ends the call.
    Hang,
}

impl Failure {
    async fn into_error(self) -> CollaboratorError {
        match self {
            Failure::Failed(message) => CollaboratorError::Failed(message),
            Failure::Malformed(message) => CollaboratorError::Malformed(message),
            Failure::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                CollaboratorError::Failed("hung call finished".to_string())
            }
        }
    }
}

type Queue<T> = VecDeque<Result<T, Failure>>;

#[derive(Default)]
struct Script {
    consequences: Queue<Consequence>,
    plans: Queue<String>,
    motivations: Queue<String>,
    drafts: Queue<String>,
    verdicts: Queue<Verdict>,
    summaries: Queue<String>,
    compactions: Queue<String>,
    descriptions: Queue<String>,
}

/// How many times each collaborator was called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub consequences: usize,
    pub plan: usize,
    pub motivate: usize,
    pub draft: usize,
    pub verify: usize,
    pub summarize: usize,
    pub compact: usize,
    pub describe: usize,
}

/// What the planner was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCall {
    pub actor: String,
    pub user_action: String,
    pub last_actor_action: String,
    pub chronicle_tail: String,
}

#[derive(Default)]
struct Record {
    calls: CallCounts,
    consequence_calls: Vec<(String, String)>,
    plan_calls: Vec<PlanCall>,
    draft_feedback: Vec<Option<String>>,
    draft_states: Vec<WorldState>,
}

/// Scripted stand-in for every collaborator.
///
/// Replies are queued per capability and consumed in order. An empty queue
/// falls back to a harmless default (an empty consequence, a passing verdict
/// and so on).
#[derive(Default)]
pub struct MockCollaborators {
    script: Mutex<Script>,
    record: Mutex<Record>,
}

impl MockCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a consequence. `patch` must be a JSON object.
    pub fn with_consequence(self, patch: Value, actions: &[&str]) -> Self {
        let consequence = Consequence {
            patch: Patch::from_value(patch).expect("mock patch must be a JSON object"),
            completed_actions: actions.iter().map(|a| a.to_string()).collect(),
        };
        lock(&self.script).consequences.push_back(Ok(consequence));
        self
    }

    /// Queue a consequence that changes nothing.
    pub fn with_no_consequence(self) -> Self {
        lock(&self.script)
            .consequences
            .push_back(Ok(Consequence::default()));
        self
    }

    pub fn failing_consequence(self, message: &str) -> Self {
        lock(&self.script)
            .consequences
            .push_back(Err(Failure::Failed(message.to_string())));
        self
    }

    /// Queue a consequence call that never returns.
    pub fn hanging_consequence(self) -> Self {
        lock(&self.script).consequences.push_back(Err(Failure::Hang));
        self
    }

    pub fn with_plan(self, action: &str) -> Self {
        lock(&self.script).plans.push_back(Ok(action.to_string()));
        self
    }

    pub fn failing_plan(self, message: &str) -> Self {
        lock(&self.script)
            .plans
            .push_back(Err(Failure::Failed(message.to_string())));
        self
    }

    pub fn with_motivation(self, text: &str) -> Self {
        lock(&self.script).motivations.push_back(Ok(text.to_string()));
        self
    }

    pub fn failing_motivation(self, message: &str) -> Self {
        lock(&self.script)
            .motivations
            .push_back(Err(Failure::Failed(message.to_string())));
        self
    }

    pub fn with_draft(self, text: &str) -> Self {
        lock(&self.script).drafts.push_back(Ok(text.to_string()));
        self
    }

    pub fn failing_draft(self, message: &str) -> Self {
        lock(&self.script)
            .drafts
            .push_back(Err(Failure::Failed(message.to_string())));
        self
    }

    pub fn with_verdict(self, verdict: Verdict) -> Self {
        lock(&self.script).verdicts.push_back(Ok(verdict));
        self
    }

    /// Queue a verifier reply that could not be parsed.
    pub fn failing_verify_malformed(self, message: &str) -> Self {
        lock(&self.script)
            .verdicts
            .push_back(Err(Failure::Malformed(message.to_string())));
        self
    }

    pub fn with_summary(self, text: &str) -> Self {
        lock(&self.script).summaries.push_back(Ok(text.to_string()));
        self
    }

    pub fn failing_summary(self, message: &str) -> Self {
        lock(&self.script)
            .summaries
            .push_back(Err(Failure::Failed(message.to_string())));
        self
    }

    pub fn with_compaction(self, text: &str) -> Self {
        lock(&self.script).compactions.push_back(Ok(text.to_string()));
        self
    }

    pub fn failing_compaction(self, message: &str) -> Self {
        lock(&self.script)
            .compactions
            .push_back(Err(Failure::Failed(message.to_string())));
        self
    }

    pub fn with_description(self, text: &str) -> Self {
        lock(&self.script).descriptions.push_back(Ok(text.to_string()));
        self
    }

    pub fn calls(&self) -> CallCounts {
        lock(&self.record).calls.clone()
    }

    /// `(actor, action)` for each consequence call, in order.
    pub fn consequence_calls(&self) -> Vec<(String, String)> {
        lock(&self.record).consequence_calls.clone()
    }

    pub fn plan_calls(&self) -> Vec<PlanCall> {
        lock(&self.record).plan_calls.clone()
    }

    /// The feedback passed with each draft request, in order.
    pub fn draft_feedback(&self) -> Vec<Option<String>> {
        lock(&self.record).draft_feedback.clone()
    }

    /// The world each draft request was written against, in order.
    pub fn draft_states(&self) -> Vec<WorldState> {
        lock(&self.record).draft_states.clone()
    }

    /// Use these mocks for every capability.
    pub fn into_collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators::from_shared(self)
    }

    fn note(&self, update: impl FnOnce(&mut Record)) {
        update(&mut lock(&self.record));
    }
}

async fn next<T>(
    entry: Option<Result<T, Failure>>,
    default: impl FnOnce() -> T,
) -> Result<T, CollaboratorError> {
    match entry {
        Some(Ok(value)) => Ok(value),
        Some(Err(failure)) => Err(failure.into_error().await),
        None => Ok(default()),
    }
}

#[async_trait]
impl ConsequenceEngine for MockCollaborators {
    async fn consequences(
        &self,
        _state: &WorldState,
        action: &str,
        actor: &str,
    ) -> Result<Consequence, CollaboratorError> {
        self.note(|r| {
            r.calls.consequences += 1;
            r.consequence_calls.push((actor.to_string(), action.to_string()));
        });
        let entry = lock(&self.script).consequences.pop_front();
        next(entry, Consequence::default).await
    }
}

#[async_trait]
impl ActionPlanner for MockCollaborators {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<String, CollaboratorError> {
        self.note(|r| {
            r.calls.plan += 1;
            r.plan_calls.push(PlanCall {
                actor: request.actor.to_string(),
                user_action: request.user_action.to_string(),
                last_actor_action: request.last_actor_action.to_string(),
                chronicle_tail: request.chronicle_tail.to_string(),
            });
        });
        let entry = lock(&self.script).plans.pop_front();
        next(entry, || "waits quietly".to_string()).await
    }
}

#[async_trait]
impl MotivationWriter for MockCollaborators {
    async fn motivate(&self, _request: MotivationRequest<'_>) -> Result<String, CollaboratorError> {
        self.note(|r| r.calls.motivate += 1);
        let entry = lock(&self.script).motivations.pop_front();
        next(entry, || "Nothing needs a response.".to_string()).await
    }
}

#[async_trait]
impl NarrativeWriter for MockCollaborators {
    async fn draft(&self, request: DraftRequest<'_>) -> Result<String, CollaboratorError> {
        self.note(|r| {
            r.calls.draft += 1;
            r.draft_feedback.push(request.feedback.map(str::to_string));
            r.draft_states.push(request.state.clone());
        });
        let entry = lock(&self.script).drafts.pop_front();
        next(entry, || "A quiet moment passes.".to_string()).await
    }
}

#[async_trait]
impl Verifier for MockCollaborators {
    async fn verify(
        &self,
        _completed_actions: &[String],
        _narrative: &str,
    ) -> Result<Verdict, CollaboratorError> {
        self.note(|r| r.calls.verify += 1);
        let entry = lock(&self.script).verdicts.pop_front();
        next(entry, Verdict::pass).await
    }
}

#[async_trait]
impl Summarizer for MockCollaborators {
    async fn summarize_turn(
        &self,
        _request: TurnSummaryRequest<'_>,
    ) -> Result<String, CollaboratorError> {
        self.note(|r| r.calls.summarize += 1);
        let entry = lock(&self.script).summaries.pop_front();
        next(entry, || "The turn passed.".to_string()).await
    }

    async fn compact(&self, _log_text: &str) -> Result<String, CollaboratorError> {
        self.note(|r| r.calls.compact += 1);
        let entry = lock(&self.script).compactions.pop_front();
        next(entry, || "Condensed story.".to_string()).await
    }
}

#[async_trait]
impl WorldDescriber for MockCollaborators {
    async fn describe(&self, _state: &WorldState) -> Result<String, CollaboratorError> {
        self.note(|r| r.calls.describe += 1);
        let entry = lock(&self.script).descriptions.pop_front();
        next(entry, || "A quiet scene.".to_string()).await
    }
}

/// World store held in memory, counting commits.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<WorldState>>,
    commits: AtomicUsize,
    fail_commits: AtomicBool,
}

impl MemoryStateStore {
    pub fn new(state: WorldState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// A store with no world in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Make every following commit fail with an I/O error.
    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<WorldState> {
        lock(&self.state).clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<WorldState, StoreError> {
        lock(&self.state)
            .clone()
            .ok_or_else(|| StoreError::NotFound(PathBuf::from("<memory>")))
    }

    async fn commit(&self, state: &WorldState) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("commit refused")));
        }
        state.validate()?;
        *lock(&self.state) = Some(state.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Chronicle held in memory.
#[derive(Default)]
pub struct MemoryChronicle {
    entries: Mutex<Vec<String>>,
}

impl MemoryChronicle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(Into::into).collect()),
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl ChronicleStore for MemoryChronicle {
    async fn entries(&self) -> Result<Vec<String>, ChronicleError> {
        Ok(lock(&self.entries)
            .iter()
            .filter(|e| !e.trim().is_empty())
            .cloned()
            .collect())
    }

    async fn append(&self, entry: &str) -> Result<(), ChronicleError> {
        lock(&self.entries).push(entry.to_string());
        Ok(())
    }

    async fn replace(&self, text: &str) -> Result<(), ChronicleError> {
        let mut entries = lock(&self.entries);
        entries.clear();
        if !text.trim().is_empty() {
            entries.push(text.to_string());
        }
        Ok(())
    }
}

/// A turn orchestrator over in-memory storage and scripted collaborators.
pub struct TestHarness {
    pub mocks: Arc<MockCollaborators>,
    pub store: Arc<MemoryStateStore>,
    pub chronicle: Arc<MemoryChronicle>,
    orchestrator: TurnOrchestrator,
}

impl TestHarness {
    /// Harness over [`sample_world`].
    pub fn new(mocks: MockCollaborators) -> Self {
        Self::with_world(sample_world(), mocks)
    }

    pub fn with_world(world: WorldState, mocks: MockCollaborators) -> Self {
        Self::build(
            Arc::new(MemoryStateStore::new(world)),
            Arc::new(MemoryChronicle::new()),
            mocks,
        )
    }

    /// Harness with an existing chronicle.
    pub fn with_chronicle(chronicle: MemoryChronicle, mocks: MockCollaborators) -> Self {
        Self::build(
            Arc::new(MemoryStateStore::new(sample_world())),
            Arc::new(chronicle),
            mocks,
        )
    }

    fn build(
        store: Arc<MemoryStateStore>,
        chronicle: Arc<MemoryChronicle>,
        mocks: MockCollaborators,
    ) -> Self {
        let mocks = Arc::new(mocks);
        let orchestrator = TurnOrchestrator::new(
            store.clone(),
            ChronicleManager::new(chronicle.clone()),
            mocks.clone().into_collaborators(),
        );
        Self {
            mocks,
            store,
            chronicle,
            orchestrator,
        }
    }

    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.orchestrator = self.orchestrator.with_settings(settings);
        self
    }

    /// Run one turn.
    pub async fn turn(&self, acting: &str, input: &str) -> Result<TurnResult, TurnError> {
        self.orchestrator.process_turn(acting, input).await
    }

    pub fn orchestrator(&self) -> &TurnOrchestrator {
        &self.orchestrator
    }

    /// The most recently committed (or initial) world.
    pub fn world(&self) -> WorldState {
        self.store.current().expect("harness store holds a world")
    }

    pub fn commits(&self) -> usize {
        self.store.commits()
    }

    pub fn chronicle_entries(&self) -> Vec<String> {
        self.chronicle.snapshot()
    }
}

/// Assert that a character holds exactly `items`.
#[track_caller]
pub fn assert_holding(world: &WorldState, name: &str, items: &[&str]) {
    let character = world
        .character(name)
        .unwrap_or_else(|| panic!("no character named {name}"));
    assert_eq!(
        character.holding, items,
        "{name} should be holding {items:?}"
    );
}

/// Assert that a character's current action mentions `text`.
#[track_caller]
pub fn assert_action_contains(world: &WorldState, name: &str, text: &str) {
    let character = world
        .character(name)
        .unwrap_or_else(|| panic!("no character named {name}"));
    assert!(
        character.current_action.contains(text),
        "{name}'s action {:?} should mention {text:?}",
        character.current_action
    );
}

/// Assert that the turn committed exactly once.
#[track_caller]
pub fn assert_committed_once(harness: &TestHarness) {
    assert_eq!(harness.commits(), 1, "expected exactly one commit");
}

/// Assert that nothing was committed and the world is unchanged.
#[track_caller]
pub fn assert_nothing_committed(harness: &TestHarness, before: &WorldState) {
    assert_eq!(harness.commits(), 0, "expected no commit");
    assert_eq!(&harness.world(), before, "world should be unchanged");
}

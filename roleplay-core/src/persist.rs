//! Durable storage for the world document.
//!
//! Commits are atomic: the new document is written to a temporary sibling
//! file and renamed over the target, so a reader sees either the old or the
//! new world and never a partial write.

use crate::world::{SchemaError, WorldState};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("World document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No character other than {acting} is present")]
    NoCounterpart { acting: String },

    #[error("Unknown character: {0}")]
    UnknownCharacter(String),
}

/// Where the canonical world lives.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read and validate the current world.
    async fn load(&self) -> Result<WorldState, StoreError>;

    /// Replace the stored world with `state`, all or nothing.
    async fn commit(&self, state: &WorldState) -> Result<(), StoreError>;
}

/// Pick the character who reacts to `acting` this turn.
///
/// Characters are kept in name order, so with more than two characters the
/// counterpart is the alphabetically first name other than `acting`.
pub fn resolve_counterpart<'a>(state: &'a WorldState, acting: &str) -> Result<&'a str, StoreError> {
    if state.character(acting).is_none() {
        return Err(StoreError::UnknownCharacter(acting.to_string()));
    }
    state
        .character_names()
        .find(|name| *name != acting)
        .ok_or_else(|| StoreError::NoCounterpart {
            acting: acting.to_string(),
        })
}

/// A world document stored as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<WorldState, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(WorldState::from_json(&content)?)
    }

    async fn commit(&self, state: &WorldState) -> Result<(), StoreError> {
        state.validate()?;
        let content = state.to_pretty_json()?;
        write_atomic(&self.path, content.as_bytes()).await?;
        tracing::debug!(path = %self.path.display(), "World committed");
        Ok(())
    }
}

/// Write `contents` to `path` via a temporary sibling and a rename.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "world".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Patch;
    use crate::testing::sample_world_json;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_world() -> WorldState {
        WorldState::from_value(sample_world_json()).expect("fixture is valid")
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("state.json"));

        let world = sample_world();
        store.commit(&world).await.expect("commit should succeed");

        let loaded = store.load().await.expect("load should succeed");
        assert_eq!(loaded, world);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("absent.json"));

        assert!(matches!(store.load().await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_document() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, r#"{"scene": {}, "characters": {}}"#).expect("write fixture");

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Schema(_))));
    }

    #[tokio::test]
    async fn test_commit_leaves_no_temp_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("state.json"));

        let world = sample_world();
        store.commit(&world).await.expect("first commit");
        let moved = world
            .apply(&Patch::from_value(json!({"scene": {"time": "night"}})).expect("object"))
            .expect("valid patch");
        store.commit(&moved).await.expect("second commit");

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .expect("list dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.json"]);
        assert_eq!(store.load().await.expect("load").scene.time, "night");
    }

    #[tokio::test]
    async fn test_unknown_fields_survive_commit() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("state.json");
        let mut doc = sample_world_json();
        doc["story_arc"] = json!({"act": 2});
        std::fs::write(&path, doc.to_string()).expect("write fixture");

        let store = JsonFileStore::new(&path);
        let world = store.load().await.expect("load");
        store.commit(&world).await.expect("commit");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["story_arc"]["act"], 2);
    }

    #[test]
    fn test_resolve_counterpart() {
        let world = sample_world();
        assert_eq!(resolve_counterpart(&world, "Sveta").expect("found"), "Misha");
        assert_eq!(resolve_counterpart(&world, "Misha").expect("found"), "Sveta");
    }

    #[test]
    fn test_resolve_counterpart_unknown_acting() {
        let world = sample_world();
        assert!(matches!(
            resolve_counterpart(&world, "Olga"),
            Err(StoreError::UnknownCharacter(name)) if name == "Olga"
        ));
    }

    #[test]
    fn test_resolve_counterpart_with_no_one_else() {
        // Bypass validation to build a one-character world.
        let mut world = sample_world();
        world.characters.remove("Misha");

        assert!(matches!(
            resolve_counterpart(&world, "Sveta"),
            Err(StoreError::NoCounterpart { .. })
        ));
    }
}

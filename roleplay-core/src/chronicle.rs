//! The running story log.
//!
//! One entry per committed turn, oldest first. When the log grows past a
//! word threshold it is condensed by a [`Summarizer`] and replaced with the
//! condensed text.

use crate::collaborators::{call_with_timeout, Summarizer};
use crate::persist::write_atomic;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Returned by [`ChronicleManager::tail`] before anything has been logged.
pub const FIRST_TURN: &str = "This is the first turn of the story.";

#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw storage for chronicle text.
#[async_trait]
pub trait ChronicleStore: Send + Sync {
    /// All non-empty entries, oldest first.
    async fn entries(&self) -> Result<Vec<String>, ChronicleError>;

    /// Durably add one single-line entry at the end.
    async fn append(&self, entry: &str) -> Result<(), ChronicleError>;

    /// Replace the whole log with `text`.
    async fn replace(&self, text: &str) -> Result<(), ChronicleError>;
}

/// A chronicle kept as a plain text file, one entry per line.
#[derive(Debug, Clone)]
pub struct TextFileChronicle {
    path: PathBuf,
}

impl TextFileChronicle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChronicleStore for TextFileChronicle {
    async fn entries(&self) -> Result<Vec<String>, ChronicleError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn append(&self, entry: &str) -> Result<(), ChronicleError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{entry}\n").as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn replace(&self, text: &str) -> Result<(), ChronicleError> {
        write_atomic(&self.path, format!("{text}\n").as_bytes()).await?;
        Ok(())
    }
}

/// What [`ChronicleManager::compact_if_oversized`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compaction {
    /// The log was within the threshold.
    NotNeeded { words: usize },
    /// The log was replaced with a condensed version.
    Compacted { before: usize, after: usize },
    /// The summarizer failed or returned nothing; the log is unchanged.
    Skipped { words: usize, reason: String },
}

/// Reads, appends to and condenses the chronicle.
#[derive(Clone)]
pub struct ChronicleManager {
    store: Arc<dyn ChronicleStore>,
    call_timeout: Duration,
}

impl ChronicleManager {
    pub fn new(store: Arc<dyn ChronicleStore>) -> Self {
        Self {
            store,
            call_timeout: Duration::from_secs(120),
        }
    }

    /// Deadline for the summarizer call made during compaction.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = limit;
        self
    }

    /// Add one turn summary. Line breaks inside it are folded to spaces.
    pub async fn append(&self, summary: &str) -> Result<(), ChronicleError> {
        let entry = single_line(summary);
        if entry.is_empty() {
            return Ok(());
        }
        self.store.append(&entry).await
    }

    /// The most recent entry, or [`FIRST_TURN`] when the log is empty.
    pub async fn tail(&self) -> Result<String, ChronicleError> {
        Ok(self
            .store
            .entries()
            .await?
            .pop()
            .unwrap_or_else(|| FIRST_TURN.to_string()))
    }

    pub async fn entries(&self) -> Result<Vec<String>, ChronicleError> {
        self.store.entries().await
    }

    pub async fn full_text(&self) -> Result<String, ChronicleError> {
        Ok(self.store.entries().await?.join("\n"))
    }

    /// Whitespace-separated word count of the whole log.
    pub async fn word_count(&self) -> Result<usize, ChronicleError> {
        Ok(word_count(&self.full_text().await?))
    }

    /// Condense the log when it exceeds `threshold` words.
    ///
    /// A summarizer failure is not an error: the log stays as it was and the
    /// outcome says why.
    pub async fn compact_if_oversized(
        &self,
        threshold: usize,
        summarizer: &dyn Summarizer,
    ) -> Result<Compaction, ChronicleError> {
        let text = self.full_text().await?;
        let words = word_count(&text);
        if words <= threshold {
            return Ok(Compaction::NotNeeded { words });
        }

        info!(words, threshold, "Chronicle over limit, condensing");
        let condensed =
            match call_with_timeout(self.call_timeout, summarizer.compact(&text)).await {
                Ok(condensed) => condensed.trim().to_string(),
                Err(e) => {
                    warn!(error = %e, "Chronicle condensing failed, keeping full log");
                    return Ok(Compaction::Skipped {
                        words,
                        reason: e.to_string(),
                    });
                }
            };
        if condensed.is_empty() {
            warn!("Summarizer returned an empty chronicle, keeping full log");
            return Ok(Compaction::Skipped {
                words,
                reason: "empty summary".to_string(),
            });
        }

        self.store.replace(&condensed).await?;
        let after = word_count(&condensed);
        info!(before = words, after, "Chronicle condensed");
        Ok(Compaction::Compacted {
            before: words,
            after,
        })
    }

    /// Remove every entry.
    pub async fn reset(&self) -> Result<(), ChronicleError> {
        self.store.replace("").await
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryChronicle, MockCollaborators};
    use tempfile::TempDir;

    fn file_manager(dir: &TempDir) -> ChronicleManager {
        ChronicleManager::new(Arc::new(TextFileChronicle::new(
            dir.path().join("chronology.txt"),
        )))
    }

    #[tokio::test]
    async fn test_tail_of_empty_log() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manager = file_manager(&temp_dir);

        assert_eq!(manager.tail().await.expect("tail"), FIRST_TURN);
        assert!(manager.entries().await.expect("entries").is_empty());
    }

    #[tokio::test]
    async fn test_append_and_tail() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manager = file_manager(&temp_dir);

        manager.append("Sveta knocked.").await.expect("append");
        manager
            .append("Misha opened the door.\nHe looked tired.")
            .await
            .expect("append");

        assert_eq!(
            manager.tail().await.expect("tail"),
            "Misha opened the door. He looked tired."
        );
        assert_eq!(manager.entries().await.expect("entries").len(), 2);
        assert_eq!(manager.word_count().await.expect("count"), 9);
    }

    #[tokio::test]
    async fn test_blank_summary_is_not_logged() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manager = file_manager(&temp_dir);

        manager.append("  \n ").await.expect("append");
        assert!(manager.entries().await.expect("entries").is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_is_untouched() {
        let chronicle = Arc::new(MemoryChronicle::with_entries(["one two three"]));
        let manager = ChronicleManager::new(chronicle.clone());
        let mocks = MockCollaborators::new();

        let outcome = manager
            .compact_if_oversized(3, &mocks)
            .await
            .expect("compaction");

        assert_eq!(outcome, Compaction::NotNeeded { words: 3 });
        assert_eq!(mocks.calls().compact, 0);
        assert_eq!(chronicle.snapshot(), vec!["one two three"]);
    }

    #[tokio::test]
    async fn test_above_threshold_is_replaced() {
        let chronicle = Arc::new(MemoryChronicle::with_entries(["one two", "three four"]));
        let manager = ChronicleManager::new(chronicle.clone());
        let mocks = MockCollaborators::new().with_compaction("Everything so far.");

        let outcome = manager
            .compact_if_oversized(3, &mocks)
            .await
            .expect("compaction");

        assert_eq!(outcome, Compaction::Compacted { before: 4, after: 3 });
        assert_eq!(chronicle.snapshot(), vec!["Everything so far."]);
        assert_eq!(mocks.calls().compact, 1);
    }

    #[tokio::test]
    async fn test_summarizer_failure_keeps_log() {
        let chronicle = Arc::new(MemoryChronicle::with_entries(["one two", "three four"]));
        let manager = ChronicleManager::new(chronicle.clone());
        let mocks = MockCollaborators::new().failing_compaction("model offline");

        let outcome = manager
            .compact_if_oversized(3, &mocks)
            .await
            .expect("compaction");

        assert!(matches!(outcome, Compaction::Skipped { words: 4, .. }));
        assert_eq!(chronicle.snapshot(), vec!["one two", "three four"]);
    }

    #[tokio::test]
    async fn test_compaction_rewrites_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manager = file_manager(&temp_dir);
        for line in ["a b c", "d e f", "g h i"] {
            manager.append(line).await.expect("append");
        }
        let mocks = MockCollaborators::new().with_compaction("Condensed story.");

        manager
            .compact_if_oversized(5, &mocks)
            .await
            .expect("compaction");

        assert_eq!(manager.entries().await.expect("entries"), vec!["Condensed story."]);
        assert_eq!(manager.tail().await.expect("tail"), "Condensed story.");
    }

    #[tokio::test]
    async fn test_reset() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let manager = file_manager(&temp_dir);
        manager.append("Something happened.").await.expect("append");

        manager.reset().await.expect("reset");

        assert_eq!(manager.tail().await.expect("tail"), FIRST_TURN);
    }
}

//! Checkpointing for resumable ingestion runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::types::RagError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    processed_files: Vec<String>,
}

/// Tracks which debate files have been fully persisted so re-runs can skip
/// them. State lives in a small JSON document; a missing or corrupt file is
/// treated as an empty checkpoint, never a fatal error.
#[derive(Clone, Debug)]
pub struct CheckpointTracker {
    path: PathBuf,
    state: Arc<Mutex<HashSet<String>>>,
}

impl CheckpointTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads previously persisted state, if any.
    pub async fn load(&self) -> Result<(), RagError> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path).await?;
        match serde_json::from_str::<CheckpointFile>(&data) {
            Ok(parsed) => {
                let mut guard = self.state.lock().await;
                guard.clear();
                guard.extend(parsed.processed_files);
                info!(files = guard.len(), "loaded ingestion checkpoint");
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "corrupt checkpoint, starting fresh");
            }
        }
        Ok(())
    }

    pub async fn contains(&self, file: &str) -> bool {
        self.state.lock().await.contains(file)
    }

    /// Marks a batch of files processed and persists the updated state.
    /// Persistence happens once per batch, after the batch's rows are safely
    /// in the store.
    pub async fn mark_processed<I>(&self, files: I) -> Result<(), RagError>
    where
        I: IntoIterator<Item = String>,
    {
        let snapshot = {
            let mut guard = self.state.lock().await;
            guard.extend(files);
            let mut files: Vec<String> = guard.iter().cloned().collect();
            files.sort();
            files
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string(&CheckpointFile {
            processed_files: snapshot,
        })?;
        fs::write(&self.path, serialized).await?;
        Ok(())
    }

    /// Removes the checkpoint file and clears in-memory state.
    pub async fn clear(&self) -> Result<(), RagError> {
        self.state.lock().await.clear();
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn tracker_persists_state_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let tracker = CheckpointTracker::new(&path);
        tracker.load().await.unwrap();

        assert!(!tracker.contains("debates2025-09-16a.xml").await);
        tracker
            .mark_processed(["debates2025-09-16a.xml".to_string()])
            .await
            .unwrap();
        assert!(tracker.contains("debates2025-09-16a.xml").await);

        let reloaded = CheckpointTracker::new(&path);
        reloaded.load().await.unwrap();
        assert!(reloaded.contains("debates2025-09-16a.xml").await);
    }

    #[tokio::test]
    async fn corrupt_checkpoint_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let tracker = CheckpointTracker::new(&path);
        tracker.load().await.unwrap();
        assert!(!tracker.contains("anything.xml").await);
    }

    #[tokio::test]
    async fn clear_removes_file_and_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let tracker = CheckpointTracker::new(&path);
        tracker
            .mark_processed(["a.xml".to_string()])
            .await
            .unwrap();
        assert!(path.exists());

        tracker.clear().await.unwrap();
        assert!(!path.exists());
        assert!(!tracker.contains("a.xml").await);
    }
}

//! Stage checkpoints for interrupted episodes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::CheckpointStore;
use crate::logging::sanitize_filename;
use crate::models::{AssetMap, PipelineStage, VideoPlan};

/// Bumped whenever `CheckpointRecord` changes shape.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint (de)serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("checkpoint for '{episode_id}' has schema version {found}, expected {expected}")]
    SchemaMismatch {
        episode_id: String,
        found: u32,
        expected: u32,
    },

    #[error("checkpoint stored under '{expected}' belongs to episode '{found}'")]
    EpisodeMismatch { expected: String, found: String },
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Everything needed to resume after a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSnapshot {
    pub plan: VideoPlan,
    #[serde(default)]
    pub assets: AssetMap,
    #[serde(default)]
    pub video_path: Option<PathBuf>,
    #[serde(default)]
    pub publish_id: Option<String>,
}

impl EpisodeSnapshot {
    pub fn new(plan: VideoPlan) -> Self {
        Self {
            plan,
            assets: AssetMap::new(),
            video_path: None,
            publish_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub schema_version: u32,
    pub episode_id: String,
    pub stage: PipelineStage,
    pub saved_at: DateTime<Utc>,
    pub snapshot: EpisodeSnapshot,
}

/// Header read before the full record so version changes are caught
/// even when the rest no longer parses.
#[derive(Deserialize)]
struct RecordHeader {
    schema_version: u32,
    episode_id: String,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSummary {
    pub episode_id: String,
    pub stage: PipelineStage,
    pub saved_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    fn key(episode_id: &str) -> String {
        sanitize_filename(episode_id)
    }

    /// Record that `stage` completed. Overwrites any earlier checkpoint.
    pub fn save(
        &self,
        episode_id: &str,
        stage: PipelineStage,
        snapshot: &EpisodeSnapshot,
    ) -> CheckpointResult<CheckpointRecord> {
        let record = CheckpointRecord {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            episode_id: episode_id.to_string(),
            stage,
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.store.put(&Self::key(episode_id), &bytes)?;

        tracing::debug!(episode = episode_id, stage = ?stage, "checkpoint saved");
        Ok(record)
    }

    pub fn load(&self, episode_id: &str) -> CheckpointResult<Option<CheckpointRecord>> {
        let Some(bytes) = self.store.get(&Self::key(episode_id))? else {
            return Ok(None);
        };

        let header: RecordHeader = serde_json::from_slice(&bytes)?;
        if header.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(CheckpointError::SchemaMismatch {
                episode_id: episode_id.to_string(),
                found: header.schema_version,
                expected: CHECKPOINT_SCHEMA_VERSION,
            });
        }
        if header.episode_id != episode_id {
            return Err(CheckpointError::EpisodeMismatch {
                expected: episode_id.to_string(),
                found: header.episode_id,
            });
        }

        let record: CheckpointRecord = serde_json::from_slice(&bytes)?;
        tracing::info!(
            episode = episode_id,
            stage = ?record.stage,
            saved_at = %record.saved_at,
            "checkpoint loaded"
        );
        Ok(Some(record))
    }

    pub fn clear(&self, episode_id: &str) -> CheckpointResult<()> {
        self.store.delete(&Self::key(episode_id))?;
        tracing::debug!(episode = episode_id, "checkpoint cleared");
        Ok(())
    }

    /// Readable checkpoints, oldest first. Unreadable ones are skipped.
    pub fn list(&self) -> CheckpointResult<Vec<CheckpointSummary>> {
        let mut summaries = Vec::new();
        for key in self.store.keys()? {
            let Some(bytes) = self.store.get(&key)? else {
                continue;
            };
            match serde_json::from_slice::<CheckpointRecord>(&bytes) {
                Ok(record) if record.schema_version == CHECKPOINT_SCHEMA_VERSION => {
                    summaries.push(CheckpointSummary {
                        episode_id: record.episode_id,
                        stage: record.stage,
                        saved_at: record.saved_at,
                    });
                }
                Ok(record) => {
                    tracing::warn!(key = %key, version = record.schema_version, "skipping checkpoint with old schema");
                }
                Err(e) => tracing::warn!(key = %key, "skipping unreadable checkpoint: {}", e),
            }
        }
        summaries.sort_by_key(|s| s.saved_at);
        Ok(summaries)
    }
}

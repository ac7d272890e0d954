//! Checkpoint and resume.
//!
//! After each pipeline stage the episode's state is saved under its id.
//! A later run loads it and continues from the stage after the saved one,
//! reusing the asset map instead of calling providers again.

mod manager;
mod store;

pub use manager::{
    CheckpointError, CheckpointManager, CheckpointRecord, CheckpointResult, CheckpointSummary,
    EpisodeSnapshot, CHECKPOINT_SCHEMA_VERSION,
};
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};

//! Reel Core - asset pipeline and timeline composition for generated short videos
//!
//! Takes a finished content plan and turns it into one rendered vertical
//! video: concurrent asset generation with quality gating and fallbacks,
//! narration-to-runtime reconciliation, pattern-driven timeline
//! composition, and stage checkpoints for resuming interrupted runs.

pub mod assets;
pub mod checkpoint;
pub mod config;
pub mod episode;
pub mod governor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod quality;
pub mod reconcile;
pub mod render;
pub mod timeline;

pub use episode::{EpisodeOutput, EpisodeRunner, ResumePoint};
pub use pipeline::{PipelineError, PipelineResult};

/// Version of this crate, from Cargo metadata.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

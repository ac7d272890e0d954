//! Final encode of a timeline into a 1080x1920 video.
//!
//! The encoder is a trait so the pipeline can run without ffmpeg in tests.

mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::timeline::Timeline;

pub use ffmpeg::{FfmpegArgsBuilder, FfmpegEncoder};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {exit_code}: {stderr_tail}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("{program} still running after {secs}s, killed")]
    TimedOut { program: String, secs: u64 },

    #[error("encoder reported success but {0} is missing")]
    MissingOutput(PathBuf),
}

impl RenderError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[async_trait]
pub trait RenderEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// Encode `timeline` to `output`, returning the written path.
    async fn encode(&self, timeline: &Timeline, output: &Path) -> RenderResult<PathBuf>;
}

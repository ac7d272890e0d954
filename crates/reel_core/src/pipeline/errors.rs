//! Error types for the episode pipeline.
//!
//! Errors nest from the inside out:
//! Episode → Step → Operation → Detail

use std::io;

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::providers::ProviderError;
use crate::reconcile::ReconcileError;
use crate::render::RenderError;
use crate::timeline::CompositionError;

/// Top-level pipeline error with episode context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A step returned an error.
    #[error("Episode '{episode_id}' failed at step '{step_name}': {source}")]
    StepFailed {
        episode_id: String,
        step_name: String,
        #[source]
        source: StepError,
    },

    /// The plan was rejected before the pipeline started.
    #[error("Episode '{episode_id}' failed validation: {message}")]
    ValidationFailed { episode_id: String, message: String },

    /// The plan no longer matches the checkpoint it is resumed from.
    #[error("Episode '{episode_id}' cannot resume: {source}")]
    PlanChanged {
        episode_id: String,
        #[source]
        source: ReconcileError,
    },

    /// Stopped by a `CancelHandle` between steps.
    #[error("Episode '{episode_id}' was cancelled")]
    Cancelled { episode_id: String },

    /// Failed to set up the episode (directories, log file).
    #[error("Episode '{episode_id}' setup failed: {message}")]
    SetupFailed { episode_id: String, message: String },

    /// A checkpoint could not be read or written.
    #[error("Episode '{episode_id}' checkpoint error: {source}")]
    Checkpoint {
        episode_id: String,
        #[source]
        source: CheckpointError,
    },
}

impl PipelineError {
    pub fn step_failed(
        episode_id: impl Into<String>,
        step_name: impl Into<String>,
        source: StepError,
    ) -> Self {
        Self::StepFailed {
            episode_id: episode_id.into(),
            step_name: step_name.into(),
            source,
        }
    }

    pub fn validation_failed(episode_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            episode_id: episode_id.into(),
            message: message.into(),
        }
    }

    pub fn plan_changed(episode_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PlanChanged {
            episode_id: episode_id.into(),
            source: ReconcileError::Impossible(message.into()),
        }
    }

    pub fn setup_failed(episode_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            episode_id: episode_id.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(episode_id: impl Into<String>) -> Self {
        Self::Cancelled {
            episode_id: episode_id.into(),
        }
    }

    pub fn checkpoint(episode_id: impl Into<String>, source: CheckpointError) -> Self {
        Self::Checkpoint {
            episode_id: episode_id.into(),
            source,
        }
    }

    /// The step that failed, if the error came from one.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step_name, .. } => Some(step_name),
            _ => None,
        }
    }
}

/// What went wrong inside a single step.
#[derive(Error, Debug)]
pub enum StepError {
    /// Preconditions on the episode state were not met.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// The step ran but left the state inconsistent.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// Filesystem failure, tagged with what was being attempted.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// An artifact the step depends on is missing on disk.
    #[error("Required file not found: {path}")]
    FileNotFound { path: String },

    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("publish failed: {0}")]
    Publish(#[source] ProviderError),

    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Wrap an I/O error with the operation name.
    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

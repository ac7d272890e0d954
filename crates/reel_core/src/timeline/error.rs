//! Composition errors.

use thiserror::Error;

use crate::models::SceneId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    /// The composed timeline broke a structural invariant.
    #[error("composition invariant violated ({what}): expected {expected:.3}s, got {actual:.3}s\n{breakdown}")]
    InvariantViolation {
        what: &'static str,
        expected: f64,
        actual: f64,
        breakdown: String,
    },

    /// Reconciliation has no duration for a plan scene.
    #[error("no reconciled duration for scene {0}")]
    MissingScene(SceneId),
}

impl CompositionError {
    pub fn invariant(
        what: &'static str,
        expected: f64,
        actual: f64,
        breakdown: impl Into<String>,
    ) -> Self {
        Self::InvariantViolation {
            what,
            expected,
            actual,
            breakdown: breakdown.into(),
        }
    }
}

pub type CompositionResult<T> = Result<T, CompositionError>;

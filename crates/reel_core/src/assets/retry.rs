//! Retry decisions for a single asset request.
//!
//! `decide` is pure: given the attempt number and what the attempt produced,
//! it says whether to accept, retry with perturbed parameters, or give up.

use std::fmt;
use std::time::Duration;

use crate::config::{OrchestratorSettings, QualitySettings};
use crate::models::GenerationParams;

/// Seed stride between attempts.
const SEED_STRIDE: u64 = 7919;

/// Why one attempt did not produce an acceptable asset.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// Timeout, rate limit, 5xx, malformed payload.
    Transient(String),
    /// The quality gate scored the output below threshold.
    QualityRejected { score: f64, threshold: f64 },
    /// The capability is not available at all. Never retried.
    Unavailable(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transient(reason) => write!(f, "transient: {}", reason),
            AttemptFailure::QualityRejected { score, threshold } => {
                write!(f, "quality {:.3} below {:.2}", score, threshold)
            }
            AttemptFailure::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    Accept(T),
    Retry(GenerationParams),
    Fallback(String),
}

/// Attempt limit, backoff and prompt perturbations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step; attempt n waits n * step before the next try.
    pub backoff_step: Duration,
    pub prompt_suffixes: Vec<String>,
}

impl RetryPolicy {
    pub fn from_settings(quality: &QualitySettings, orchestrator: &OrchestratorSettings) -> Self {
        Self {
            max_attempts: quality.max_attempts.max(1),
            backoff_step: Duration::from_millis(orchestrator.retry_backoff_ms),
            prompt_suffixes: quality.prompt_suffixes.clone(),
        }
    }

    /// Delay before the attempt following `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Decide after attempt number `attempt` (1-based).
    pub fn decide<T>(
        &self,
        attempt: u32,
        result: Result<T, AttemptFailure>,
        params: &GenerationParams,
    ) -> AttemptOutcome<T> {
        decide(attempt, self.max_attempts, result, params, &self.prompt_suffixes)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&QualitySettings::default(), &OrchestratorSettings::default())
    }
}

/// Pure retry decision.
pub fn decide<T>(
    attempt: u32,
    max_attempts: u32,
    result: Result<T, AttemptFailure>,
    params: &GenerationParams,
    suffixes: &[String],
) -> AttemptOutcome<T> {
    let failure = match result {
        Ok(asset) => return AttemptOutcome::Accept(asset),
        Err(failure) => failure,
    };

    if let AttemptFailure::Unavailable(_) = failure {
        return AttemptOutcome::Fallback(failure.to_string());
    }
    if attempt >= max_attempts {
        return AttemptOutcome::Fallback(format!(
            "{} after {} attempts",
            failure, attempt
        ));
    }

    let mut next = params.clone();
    next.seed = params.seed.wrapping_add(u64::from(attempt) * SEED_STRIDE);
    if matches!(failure, AttemptFailure::QualityRejected { .. }) && !suffixes.is_empty() {
        let index = (attempt as usize - 1) % suffixes.len();
        next.prompt_suffix = Some(suffixes[index].clone());
    }
    AttemptOutcome::Retry(next)
}

//! Duration reconciliation: narration length vs. target runtime.
//!
//! Decides the final runtime and splits it across scenes in proportion to
//! how much is spoken in each, with a per-scene floor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ExtensionMode, TimingSettings};
use crate::models::{SceneId, SceneWeight};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("reconciliation impossible: {0}")]
    Impossible(String),
}

/// How the narration relates to the final runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DurationAction {
    /// Narration is within tolerance and sets the runtime.
    Accept,
    /// Narration is short; extend it to the target.
    Extend { mode: ExtensionMode, by_secs: f64 },
    /// Narration is long; scenes were trimmed to the target.
    Trim { by_secs: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDuration {
    pub scene_id: SceneId,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub narration_secs: f64,
    pub target_secs: f64,
    pub final_secs: f64,
    pub action: DurationAction,
    pub scenes: Vec<SceneDuration>,
    /// The floor could not be honoured and scenes were split evenly.
    pub even_split: bool,
}

impl Reconciliation {
    pub fn scene_duration(&self, scene_id: SceneId) -> Option<f64> {
        self.scenes
            .iter()
            .find(|s| s.scene_id == scene_id)
            .map(|s| s.duration_secs)
    }
}

#[derive(Debug, Clone)]
pub struct DurationReconciler {
    tolerance_ratio: f64,
    min_scene_secs: f64,
    extension: ExtensionMode,
}

impl DurationReconciler {
    pub fn new(settings: &TimingSettings) -> Self {
        Self {
            tolerance_ratio: settings.tolerance_ratio,
            min_scene_secs: settings.min_scene_secs,
            extension: settings.extension,
        }
    }

    pub fn reconcile(
        &self,
        narration_secs: f64,
        target_secs: f64,
        scenes: &[SceneWeight],
    ) -> Result<Reconciliation, ReconcileError> {
        if !target_secs.is_finite() || target_secs <= 0.0 {
            return Err(ReconcileError::Impossible(format!(
                "target runtime {} is not positive",
                target_secs
            )));
        }
        if scenes.is_empty() {
            return Err(ReconcileError::Impossible("plan has no scenes".into()));
        }
        let narration_secs = if narration_secs.is_finite() {
            narration_secs.max(0.0)
        } else {
            0.0
        };

        let lower = target_secs * (1.0 - self.tolerance_ratio);
        let upper = target_secs * (1.0 + self.tolerance_ratio);

        let (final_secs, action, mut durations, even_split) = if narration_secs < lower {
            let mode = if narration_secs <= 0.0 {
                ExtensionMode::PadSilence
            } else {
                self.extension
            };
            let (durations, even) = self.allocate(target_secs, scenes);
            let action = DurationAction::Extend {
                mode,
                by_secs: target_secs - narration_secs,
            };
            (target_secs, action, durations, even)
        } else if narration_secs > upper {
            let (durations, even) = self.allocate(narration_secs, scenes);
            let durations = if even {
                even_split(target_secs, scenes.len())
            } else {
                self.trim(durations, narration_secs - target_secs, scenes)
            };
            let action = DurationAction::Trim {
                by_secs: narration_secs - target_secs,
            };
            (target_secs, action, durations, even)
        } else {
            let (durations, even) = self.allocate(narration_secs, scenes);
            (narration_secs, DurationAction::Accept, durations, even)
        };

        fix_residual(&mut durations, final_secs);
        if even_split {
            tracing::warn!(
                final_secs,
                scenes = scenes.len(),
                min_scene_secs = self.min_scene_secs,
                "runtime too short for the per-scene minimum, splitting evenly"
            );
        }

        Ok(Reconciliation {
            narration_secs,
            target_secs,
            final_secs,
            action,
            scenes: scenes
                .iter()
                .zip(durations)
                .map(|(scene, duration_secs)| SceneDuration {
                    scene_id: scene.scene_id,
                    duration_secs,
                })
                .collect(),
            even_split,
        })
    }

    /// Proportional split with a floor (water-filling). Returns the
    /// durations and whether an even split had to be used instead.
    fn allocate(&self, total: f64, scenes: &[SceneWeight]) -> (Vec<f64>, bool) {
        let n = scenes.len();
        let floor = self.min_scene_secs;
        if total < floor * n as f64 {
            return (even_split(total, n), true);
        }

        let weights: Vec<f64> = scenes.iter().map(|s| s.spoken_lines.max(1) as f64).collect();
        let mut pinned = vec![false; n];
        let mut durations = vec![0.0; n];

        loop {
            let free_weight: f64 = (0..n).filter(|i| !pinned[*i]).map(|i| weights[i]).sum();
            let pinned_total = floor * pinned.iter().filter(|p| **p).count() as f64;
            let remaining = total - pinned_total;

            let mut newly_pinned = false;
            for i in 0..n {
                if pinned[i] {
                    durations[i] = floor;
                    continue;
                }
                durations[i] = remaining * weights[i] / free_weight;
                if durations[i] < floor {
                    pinned[i] = true;
                    newly_pinned = true;
                }
            }

            if !newly_pinned {
                break;
            }
        }

        (durations, false)
    }

    /// Remove `excess` from scenes, non-hook scenes first, never below the floor.
    fn trim(&self, mut durations: Vec<f64>, mut excess: f64, scenes: &[SceneWeight]) -> Vec<f64> {
        let floor = self.min_scene_secs;
        for hook_pass in [false, true] {
            while excess > 1e-9 {
                let open: Vec<usize> = (0..durations.len())
                    .filter(|i| scenes[*i].hook == hook_pass && durations[*i] > floor + 1e-9)
                    .collect();
                if open.is_empty() {
                    break;
                }
                let share = excess / open.len() as f64;
                for i in open {
                    let cut = share.min(durations[i] - floor);
                    durations[i] -= cut;
                    excess -= cut;
                }
            }
        }
        durations
    }
}

fn even_split(total: f64, n: usize) -> Vec<f64> {
    vec![total / n as f64; n]
}

/// Push floating-point residue onto the longest scene so the sum is exact.
fn fix_residual(durations: &mut [f64], total: f64) {
    let sum: f64 = durations.iter().sum();
    let residual = total - sum;
    if residual.abs() < f64::EPSILON {
        return;
    }
    if let Some(longest) = durations
        .iter_mut()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    {
        *longest += residual;
    }
}

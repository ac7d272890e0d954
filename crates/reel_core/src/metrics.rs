//! Per-episode render metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{AssetMap, PipelineStage, RequestId};
use crate::timeline::Timeline;

/// How a step ended, as far as metrics care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    /// Done by an earlier run and restored from its checkpoint.
    Restored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub step: String,
    pub status: StepStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderMetrics {
    pub stage_timings: Vec<StageTiming>,
    /// Quality score of every gated asset that produced one.
    pub quality_scores: BTreeMap<RequestId, f64>,
    pub resolved: usize,
    pub fallback: usize,
    pub failed: usize,
    /// Taken from the asset store or a checkpoint instead of produced.
    pub reused: usize,
    /// External collaborator calls made by this run.
    pub producer_calls: u64,
    pub layer_count: usize,
    pub final_duration_secs: f64,
    #[serde(default)]
    pub resumed_from: Option<PipelineStage>,
}

impl RenderMetrics {
    pub fn record_step(&mut self, step: &str, status: StepStatus, elapsed: Duration) {
        self.stage_timings.push(StageTiming {
            step: step.to_string(),
            status,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    /// Count outcomes. With `restored` every entry counts as reused.
    pub fn record_assets(&mut self, assets: &AssetMap, restored: bool) {
        self.quality_scores.clear();
        self.resolved = 0;
        self.fallback = 0;
        self.failed = 0;
        self.reused = 0;

        for result in assets.values() {
            if result.is_resolved() {
                self.resolved += 1;
            } else if result.is_fallback() {
                self.fallback += 1;
            } else {
                self.failed += 1;
            }
            if restored || result.reused {
                self.reused += 1;
            }
            if let Some(score) = result.quality_score {
                self.quality_scores.insert(result.request_id.clone(), score);
            }
        }
    }

    pub fn record_timeline(&mut self, timeline: &Timeline) {
        self.layer_count = timeline.layers.len();
        self.final_duration_secs = timeline.final_duration_secs;
    }

    pub fn step(&self, name: &str) -> Option<&StageTiming> {
        self.stage_timings.iter().find(|t| t.step == name)
    }

    pub fn total_assets(&self) -> usize {
        self.resolved + self.fallback + self.failed
    }

    /// One-line summary for the episode log.
    pub fn summary(&self) -> String {
        format!(
            "{} assets ({} resolved, {} fallback, {} failed, {} reused), {} provider calls, {} layers, {:.2}s",
            self.total_assets(),
            self.resolved,
            self.fallback,
            self.failed,
            self.reused,
            self.producer_calls,
            self.layer_count,
            self.final_duration_secs
        )
    }
}

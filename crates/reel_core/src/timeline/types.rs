//! Timeline data types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{MediaKind, RequestId, SceneId};

/// What a layer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    TalkingHead,
    Broll,
    /// Visual sub-cut under narration, in a scene with no talking heads.
    NarrationCut,
}

/// Source of a layer's frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSource {
    Asset {
        request_id: RequestId,
        path: PathBuf,
        media: MediaKind,
        /// Stand-in for a failed generation.
        #[serde(default)]
        degraded: bool,
    },
    /// Nothing usable on disk; the encoder draws a solid frame.
    Placeholder { label: String },
}

impl LayerSource {
    /// Still sources get a Ken Burns move, video sources play as-is.
    pub fn is_still(&self) -> bool {
        match self {
            LayerSource::Asset { media, .. } => *media != MediaKind::Video,
            LayerSource::Placeholder { .. } => true,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            LayerSource::Asset { request_id, .. } => request_id,
            LayerSource::Placeholder { label } => label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    Cut,
    Fade { secs: f64 },
    Crossfade { secs: f64 },
}

impl Transition {
    pub fn secs(&self) -> f64 {
        match self {
            Transition::Cut => 0.0,
            Transition::Fade { secs } | Transition::Crossfade { secs } => *secs,
        }
    }

    /// Same kind, at most `max` seconds long.
    pub fn clamped(self, max: f64) -> Self {
        match self {
            Transition::Cut => Transition::Cut,
            Transition::Fade { secs } => Transition::Fade { secs: secs.min(max) },
            Transition::Crossfade { secs } => Transition::Crossfade { secs: secs.min(max) },
        }
    }
}

/// Direction of the slow pan on a still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pan {
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl Pan {
    const ROTATION: [Pan; 5] = [Pan::Center, Pan::Left, Pan::Up, Pan::Right, Pan::Down];

    pub fn for_index(index: usize) -> Self {
        Self::ROTATION[index % Self::ROTATION.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Motion {
    KenBurns {
        start_scale: f64,
        end_scale: f64,
        pan: Pan,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub index: usize,
    pub scene_id: SceneId,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub source: LayerSource,
    pub role: LayerRole,
    pub transition: Transition,
    #[serde(default)]
    pub motion: Option<Motion>,
    /// Spoken line shown, for talking-head layers.
    #[serde(default)]
    pub line: Option<usize>,
}

impl Layer {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioSource {
    File { path: PathBuf },
    Silence,
}

/// A stretch of the soundtrack taken from `source` starting at `offset_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    pub start_secs: f64,
    pub duration_secs: f64,
    pub source: AudioSource,
    #[serde(default)]
    pub offset_secs: f64,
    /// Spoken line, for character voice segments.
    #[serde(default)]
    pub line: Option<usize>,
}

/// Contiguous soundtrack covering the whole video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeAudio {
    pub segments: Vec<AudioSegment>,
}

impl CompositeAudio {
    pub fn total_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }
}

/// Ordered layers plus soundtrack, ready for the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub episode_id: String,
    pub width: u32,
    pub height: u32,
    pub final_duration_secs: f64,
    pub layers: Vec<Layer>,
    pub audio: CompositeAudio,
}

impl Timeline {
    pub fn total_secs(&self) -> f64 {
        self.layers.iter().map(|l| l.duration_secs).sum()
    }

    pub fn layers_for_scene(&self, scene_id: SceneId) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(move |l| l.scene_id == scene_id)
    }

    /// One line per layer, used when an invariant check fails.
    pub fn breakdown(&self) -> String {
        describe_layers(&self.layers)
    }
}

pub(crate) fn describe_layers(layers: &[Layer]) -> String {
    layers
        .iter()
        .map(|l| {
            format!(
                "#{:<3} scene {:<3} {:>8.3}s +{:>7.3}s {:<13} {}",
                l.index,
                l.scene_id,
                l.start_secs,
                l.duration_secs,
                format!("{:?}", l.role),
                l.source.label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

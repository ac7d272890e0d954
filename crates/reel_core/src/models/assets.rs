//! Asset requests and their results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::enums::{CapabilityClass, MediaKind};
use super::plan::{SceneId, VoiceDescriptor};

/// Deterministic request identifier derived from the plan.
pub type RequestId = String;

/// Complete map of results keyed by request id.
pub type AssetMap = BTreeMap<RequestId, AssetResult>;

/// Which visual of a scene is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneVariant {
    Primary,
    /// Attention-grabbing variant for the opening scene.
    Hook,
}

/// What an asset request produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetKind {
    NarrationAudio,
    CharacterVoiceAudio { line: usize },
    CharacterPortrait { character_id: String },
    CharacterTalkingClip { character_id: String, line: usize },
    SceneVisual { scene_id: SceneId, variant: SceneVariant },
    BrollVisual { scene_id: SceneId, slot: usize },
}

impl AssetKind {
    /// Deterministic request id for this kind.
    pub fn request_id(&self) -> RequestId {
        match self {
            AssetKind::NarrationAudio => "narration".to_string(),
            AssetKind::CharacterVoiceAudio { line } => format!("voice-{}", line),
            AssetKind::CharacterPortrait { character_id } => format!("portrait-{}", character_id),
            AssetKind::CharacterTalkingClip { line, .. } => format!("talking-{}", line),
            AssetKind::SceneVisual {
                scene_id,
                variant: SceneVariant::Primary,
            } => format!("scene-{}", scene_id),
            AssetKind::SceneVisual {
                scene_id,
                variant: SceneVariant::Hook,
            } => format!("scene-{}-hook", scene_id),
            AssetKind::BrollVisual { scene_id, slot } => format!("broll-{}-{}", scene_id, slot),
        }
    }

    /// Capability class used for rate governing.
    pub fn capability(&self) -> CapabilityClass {
        match self {
            AssetKind::NarrationAudio | AssetKind::CharacterVoiceAudio { .. } => {
                CapabilityClass::Speech
            }
            AssetKind::CharacterTalkingClip { .. } => CapabilityClass::TalkingClip,
            AssetKind::CharacterPortrait { .. }
            | AssetKind::SceneVisual { .. }
            | AssetKind::BrollVisual { .. } => CapabilityClass::Image,
        }
    }

    /// Media kind of a genuinely produced file.
    pub fn media(&self) -> MediaKind {
        match self.capability() {
            CapabilityClass::Speech => MediaKind::Audio,
            CapabilityClass::Image => MediaKind::Image,
            CapabilityClass::TalkingClip => MediaKind::Video,
        }
    }

    /// Visual assets pass through the quality gate.
    pub fn is_image(&self) -> bool {
        self.capability() == CapabilityClass::Image
    }

    pub fn is_portrait(&self) -> bool {
        matches!(self, AssetKind::CharacterPortrait { .. })
    }

    /// Short role label, used for fallback lookup and placeholder colouring.
    pub fn role(&self) -> &'static str {
        match self {
            AssetKind::NarrationAudio => "narration",
            AssetKind::CharacterVoiceAudio { .. } => "voice",
            AssetKind::CharacterPortrait { .. } => "portrait",
            AssetKind::CharacterTalkingClip { .. } => "talking",
            AssetKind::SceneVisual { .. } => "scene",
            AssetKind::BrollVisual { .. } => "broll",
        }
    }
}

/// Parameters handed to the synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Prompt (image kinds) or text to speak (speech kinds).
    pub prompt: String,
    pub seed: u64,
    /// Non-semantic suffix appended after a quality rejection.
    #[serde(default)]
    pub prompt_suffix: Option<String>,
    #[serde(default)]
    pub duration_hint_secs: Option<f64>,
    #[serde(default)]
    pub voice: Option<VoiceDescriptor>,
    /// Style hint for image synthesis.
    #[serde(default)]
    pub style: String,
    /// B-roll category, used to pick a provisioned fallback.
    #[serde(default)]
    pub category: Option<String>,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>, seed: u64) -> Self {
        Self {
            prompt: prompt.into(),
            seed,
            prompt_suffix: None,
            duration_hint_secs: None,
            voice: None,
            style: String::new(),
            category: None,
        }
    }

    /// Prompt with the suffix applied.
    pub fn effective_prompt(&self) -> String {
        match &self.prompt_suffix {
            Some(suffix) if !suffix.is_empty() => format!("{}, {}", self.prompt, suffix),
            _ => self.prompt.clone(),
        }
    }
}

/// One unit of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRequest {
    pub id: RequestId,
    pub kind: AssetKind,
    pub params: GenerationParams,
}

impl AssetRequest {
    pub fn new(kind: AssetKind, params: GenerationParams) -> Self {
        Self {
            id: kind.request_id(),
            kind,
            params,
        }
    }
}

/// A file on disk holding an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFile {
    pub path: PathBuf,
    pub media: MediaKind,
    /// Duration for audio and video files.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl AssetFile {
    pub fn new(path: impl Into<PathBuf>, media: MediaKind) -> Self {
        Self {
            path: path.into(),
            media,
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// Where a degraded asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    /// Pre-provisioned file from the fallback directory.
    Provisioned,
    /// Synthesized solid frame or silent audio.
    Placeholder,
    /// Character portrait standing in for a talking clip.
    StaticPortrait,
}

/// Terminal state of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetOutcome {
    Resolved {
        file: AssetFile,
    },
    Fallback {
        file: AssetFile,
        source: FallbackSource,
        reason: String,
    },
    Failed {
        reason: String,
        #[serde(default)]
        substitute: Option<AssetFile>,
    },
}

impl AssetOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AssetOutcome::Resolved { .. } => "resolved",
            AssetOutcome::Fallback { .. } => "fallback",
            AssetOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of one request. Set exactly once, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetResult {
    pub request_id: RequestId,
    pub kind: AssetKind,
    pub outcome: AssetOutcome,
    pub attempts: u32,
    #[serde(default)]
    pub quality_score: Option<f64>,
    pub elapsed_ms: u64,
    /// Loaded from the asset store instead of produced on this run.
    #[serde(default)]
    pub reused: bool,
}

impl AssetResult {
    /// The file composition should use, whatever the outcome.
    pub fn usable_file(&self) -> Option<&AssetFile> {
        match &self.outcome {
            AssetOutcome::Resolved { file } => Some(file),
            AssetOutcome::Fallback { file, .. } => Some(file),
            AssetOutcome::Failed { substitute, .. } => substitute.as_ref(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, AssetOutcome::Resolved { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, AssetOutcome::Fallback { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, AssetOutcome::Failed { .. })
    }

    /// A genuine asset, not a stand-in.
    pub fn genuine_file(&self) -> Option<&AssetFile> {
        match &self.outcome {
            AssetOutcome::Resolved { file } => Some(file),
            _ => None,
        }
    }
}

//! Core enums used throughout the pipeline.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Edit pattern declared by the content plan.
///
/// Governs how visual layers are ordered and timed within each scene.
/// Deserialization is total: a missing, null, or unrecognized pattern
/// becomes [`EditPattern::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EditPattern {
    /// Talking heads dominate each scene, b-roll surrounds them.
    TalkingHeadHeavy,
    /// Long b-roll segments with at most one short talking head per scene.
    BrollCinematic,
    /// Fast alternation with short early cuts.
    MixedRapid,
    /// Even alternation of talking heads and b-roll.
    #[default]
    Default,
}

impl EditPattern {
    /// Parse a declared pattern name. Unknown names map to `Default`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "talking_head_heavy" => Self::TalkingHeadHeavy,
            "broll_cinematic" | "b_roll_cinematic" => Self::BrollCinematic,
            "mixed_rapid" => Self::MixedRapid,
            _ => Self::Default,
        }
    }

    /// Canonical snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TalkingHeadHeavy => "talking_head_heavy",
            Self::BrollCinematic => "broll_cinematic",
            Self::MixedRapid => "mixed_rapid",
            Self::Default => "default",
        }
    }

    /// Get all patterns.
    pub fn all() -> &'static [EditPattern] {
        &[
            Self::TalkingHeadHeavy,
            Self::BrollCinematic,
            Self::MixedRapid,
            Self::Default,
        ]
    }
}

impl std::fmt::Display for EditPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for EditPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EditPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|name| Self::from_name(&name)).unwrap_or_default())
    }
}

/// External capability class, used for rate governing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    /// Text-to-speech synthesis.
    Speech,
    /// Image synthesis.
    Image,
    /// Talking-clip / lip-sync synthesis.
    TalkingClip,
}

impl std::fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityClass::Speech => write!(f, "speech"),
            CapabilityClass::Image => write!(f, "image"),
            CapabilityClass::TalkingClip => write!(f, "talking_clip"),
        }
    }
}

/// Kind of media a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Video,
}

impl MediaKind {
    /// File extension used for files of this kind in the asset store.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "wav",
            MediaKind::Image => "png",
            MediaKind::Video => "mp4",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Major pipeline stage recorded in checkpoints.
///
/// Ordered: a stage compares greater than every stage that precedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    PlanBuilt,
    AssetsGenerated,
    Rendered,
    Uploaded,
}

impl PipelineStage {
    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            Self::PlanBuilt => Some(Self::AssetsGenerated),
            Self::AssetsGenerated => Some(Self::Rendered),
            Self::Rendered => Some(Self::Uploaded),
            Self::Uploaded => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlanBuilt => write!(f, "plan_built"),
            Self::AssetsGenerated => write!(f, "assets_generated"),
            Self::Rendered => write!(f, "rendered"),
            Self::Uploaded => write!(f, "uploaded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default)]
        pattern: EditPattern,
    }

    #[test]
    fn unknown_pattern_maps_to_default() {
        let parsed: Holder = serde_json::from_str(r#"{"pattern": "vaporwave"}"#).unwrap();
        assert_eq!(parsed.pattern, EditPattern::Default);
    }

    #[test]
    fn null_and_missing_pattern_map_to_default() {
        let null: Holder = serde_json::from_str(r#"{"pattern": null}"#).unwrap();
        let missing: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(null.pattern, EditPattern::Default);
        assert_eq!(missing.pattern, EditPattern::Default);
    }

    #[test]
    fn known_patterns_parse() {
        assert_eq!(EditPattern::from_name("mixed_rapid"), EditPattern::MixedRapid);
        assert_eq!(
            EditPattern::from_name("Talking-Head-Heavy"),
            EditPattern::TalkingHeadHeavy
        );
        for pattern in EditPattern::all() {
            assert_eq!(EditPattern::from_name(pattern.name()), *pattern);
        }
    }

    #[test]
    fn stages_are_ordered() {
        assert!(PipelineStage::PlanBuilt < PipelineStage::AssetsGenerated);
        assert!(PipelineStage::Rendered < PipelineStage::Uploaded);
        assert_eq!(PipelineStage::Uploaded.next(), None);
    }
}

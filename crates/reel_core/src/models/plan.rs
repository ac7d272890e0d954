//! The immutable video plan produced upstream.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enums::EditPattern;

/// Scene identifier (1-indexed by convention, unique within a plan).
pub type SceneId = u32;

/// Structural problems that make a plan unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("target runtime must be positive, got {0}")]
    NonPositiveRuntime(f64),

    #[error("plan has no scenes")]
    NoScenes,

    #[error("duplicate scene id {0}")]
    DuplicateScene(SceneId),

    #[error("spoken line {line} targets unknown scene {scene_id}")]
    UnknownScene { line: usize, scene_id: SceneId },

    #[error("spoken line {line} is spoken by unknown character '{character_id}'")]
    UnknownCharacter { line: usize, character_id: String },
}

/// Voice selection passed to the speech synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Provider-specific voice id (None = provider default).
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Free-form style hint (e.g. "deep male, stern").
    #[serde(default)]
    pub style: String,
}

/// A b-roll slot declared on a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrollSlot {
    /// Category (establishing_scene, mid_shot, emotional_closeup, ...).
    pub category: String,
    /// Image prompt for this slot.
    pub prompt: String,
}

/// One scene of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    /// Narration spoken over this scene.
    pub narration: String,
    /// Emotion tag (tense, shocked, relieved, ...).
    #[serde(default = "default_emotion")]
    pub emotion: String,
    /// Prompt for the scene's primary visual. Empty = derived from narration.
    #[serde(default)]
    pub visual_prompt: String,
    #[serde(default)]
    pub broll_slots: Vec<BrollSlot>,
    /// Marks the attention-grabbing opening scene. Honoured on the first scene only.
    #[serde(default)]
    pub hook: bool,
}

fn default_emotion() -> String {
    "neutral".to_string()
}

impl Scene {
    /// Number of narration sentences in this scene.
    pub fn narration_sentences(&self) -> usize {
        self.narration
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count()
    }

    /// Prompt used for the primary scene visual.
    pub fn effective_visual_prompt(&self) -> String {
        if !self.visual_prompt.trim().is_empty() {
            return self.visual_prompt.clone();
        }
        let excerpt: String = self.narration.chars().take(160).collect();
        format!(
            "photorealistic vertical frame, {} mood, {}",
            self.emotion,
            excerpt.trim()
        )
    }
}

/// A character from the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    /// Appearance description used for the portrait prompt.
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub voice: VoiceDescriptor,
}

impl Character {
    /// Prompt used for this character's portrait.
    pub fn portrait_prompt(&self) -> String {
        let role = if self.role.is_empty() {
            String::new()
        } else {
            format!(", {}", self.role)
        };
        format!(
            "photorealistic head-and-shoulders portrait of {}{}, {}, neutral background",
            self.name, role, self.appearance
        )
    }
}

/// A line spoken on screen by a character (not the narrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSpokenLine {
    pub character_id: String,
    pub text: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    /// Approximate offset in seconds from the start of the scene.
    #[serde(default)]
    pub timing_hint_secs: f64,
    pub scene_id: SceneId,
}

/// Complete content plan for one episode. Read-only inside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPlan {
    pub episode_id: String,
    #[serde(default)]
    pub title: String,
    /// Target runtime in seconds.
    pub target_runtime_secs: f64,
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub spoken_lines: Vec<CharacterSpokenLine>,
    #[serde(default)]
    pub edit_pattern: EditPattern,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub narrator_voice: VoiceDescriptor,
}

/// Per-scene weighting input for duration reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneWeight {
    pub scene_id: SceneId,
    /// Narration sentences plus character lines (at least 1).
    pub spoken_lines: usize,
    pub hook: bool,
}

/// The structural shape of a plan, compared on resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStructure {
    pub scene_ids: Vec<SceneId>,
    pub roster: BTreeSet<String>,
    pub spoken_lines: usize,
}

impl VideoPlan {
    /// Check the plan for structural problems.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !self.target_runtime_secs.is_finite() || self.target_runtime_secs <= 0.0 {
            return Err(PlanError::NonPositiveRuntime(self.target_runtime_secs));
        }
        if self.scenes.is_empty() {
            return Err(PlanError::NoScenes);
        }

        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if !seen.insert(scene.id) {
                return Err(PlanError::DuplicateScene(scene.id));
            }
        }

        for (line, spoken) in self.spoken_lines.iter().enumerate() {
            if !seen.contains(&spoken.scene_id) {
                return Err(PlanError::UnknownScene {
                    line,
                    scene_id: spoken.scene_id,
                });
            }
            if self.character(&spoken.character_id).is_none() {
                return Err(PlanError::UnknownCharacter {
                    line,
                    character_id: spoken.character_id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Look up a character by id.
    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Look up a scene by id.
    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    /// Whether the scene at `index` is the hook scene.
    pub fn is_hook_index(&self, index: usize) -> bool {
        index == 0 && self.scenes.first().map(|s| s.hook).unwrap_or(false)
    }

    /// Spoken lines targeting a scene, with their plan-wide line index.
    pub fn lines_for_scene(
        &self,
        scene_id: SceneId,
    ) -> impl Iterator<Item = (usize, &CharacterSpokenLine)> {
        self.spoken_lines
            .iter()
            .enumerate()
            .filter(move |(_, line)| line.scene_id == scene_id)
    }

    /// Full narration text, scenes joined in order.
    pub fn narration_text(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.narration.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Weights used to allocate runtime across scenes.
    pub fn scene_weights(&self) -> Vec<SceneWeight> {
        self.scenes
            .iter()
            .enumerate()
            .map(|(index, scene)| {
                let character_lines = self.lines_for_scene(scene.id).count();
                SceneWeight {
                    scene_id: scene.id,
                    spoken_lines: (scene.narration_sentences() + character_lines).max(1),
                    hook: self.is_hook_index(index),
                }
            })
            .collect()
    }

    /// Structural fingerprint used to detect plan changes on resume.
    pub fn structure(&self) -> PlanStructure {
        PlanStructure {
            scene_ids: self.scenes.iter().map(|s| s.id).collect(),
            roster: self.characters.iter().map(|c| c.id.clone()).collect(),
            spoken_lines: self.spoken_lines.len(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A plan with `scenes` scenes and no character lines.
    pub fn narration_only_plan(scenes: u32, target: f64) -> VideoPlan {
        VideoPlan {
            episode_id: "ep-test".to_string(),
            title: "Test episode".to_string(),
            target_runtime_secs: target,
            scenes: (1..=scenes)
                .map(|id| Scene {
                    id,
                    narration: "The judge looked up. Nobody moved. Then it happened.".to_string(),
                    emotion: "tense".to_string(),
                    visual_prompt: String::new(),
                    broll_slots: vec![BrollSlot {
                        category: "mid_shot".to_string(),
                        prompt: format!("courtroom detail {}", id),
                    }],
                    hook: id == 1,
                })
                .collect(),
            spoken_lines: Vec::new(),
            edit_pattern: EditPattern::Default,
            characters: Vec::new(),
            narrator_voice: VoiceDescriptor::default(),
        }
    }

    /// A plan with two characters and one spoken line per scene.
    pub fn dialogue_plan(scenes: u32, target: f64, pattern: EditPattern) -> VideoPlan {
        let mut plan = narration_only_plan(scenes, target);
        plan.edit_pattern = pattern;
        plan.characters = vec![
            Character {
                id: "judge".to_string(),
                name: "Judge Hale".to_string(),
                role: "judge".to_string(),
                appearance: "grey hair, black robe".to_string(),
                voice: VoiceDescriptor {
                    voice_id: Some("voice-judge".to_string()),
                    style: "stern".to_string(),
                },
            },
            Character {
                id: "defendant".to_string(),
                name: "Kyle".to_string(),
                role: "defendant".to_string(),
                appearance: "teenager, hoodie".to_string(),
                voice: VoiceDescriptor::default(),
            },
        ];
        plan.spoken_lines = (1..=scenes)
            .map(|scene_id| CharacterSpokenLine {
                character_id: if scene_id % 2 == 0 { "defendant" } else { "judge" }.to_string(),
                text: "You think this is funny?".to_string(),
                emotion: "angry".to_string(),
                timing_hint_secs: 1.0,
                scene_id,
            })
            .collect();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn valid_plan_passes() {
        let plan = dialogue_plan(3, 60.0, EditPattern::MixedRapid);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn rejects_structural_problems() {
        let mut plan = narration_only_plan(2, 60.0);
        plan.target_runtime_secs = 0.0;
        assert_eq!(plan.validate(), Err(PlanError::NonPositiveRuntime(0.0)));

        let mut plan = narration_only_plan(2, 60.0);
        plan.scenes.clear();
        assert_eq!(plan.validate(), Err(PlanError::NoScenes));

        let mut plan = dialogue_plan(2, 60.0, EditPattern::Default);
        plan.spoken_lines[0].scene_id = 99;
        assert!(matches!(
            plan.validate(),
            Err(PlanError::UnknownScene { scene_id: 99, .. })
        ));
    }

    #[test]
    fn scene_weights_count_sentences_and_lines() {
        let plan = dialogue_plan(2, 60.0, EditPattern::Default);
        let weights = plan.scene_weights();
        // three narration sentences + one character line
        assert_eq!(weights[0].spoken_lines, 4);
        assert!(weights[0].hook);
        assert!(!weights[1].hook);
    }

    #[test]
    fn hook_flag_only_counts_on_first_scene() {
        let mut plan = narration_only_plan(3, 60.0);
        plan.scenes[0].hook = false;
        plan.scenes[2].hook = true;
        assert!(plan.scene_weights().iter().all(|w| !w.hook));
    }

    #[test]
    fn plan_round_trips_through_json() {
        let plan = dialogue_plan(2, 45.0, EditPattern::BrollCinematic);
        let json = serde_json::to_string(&plan).unwrap();
        let parsed: VideoPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plan);
    }
}

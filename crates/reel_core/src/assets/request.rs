//! Derivation of every asset request a plan implies.

use sha2::{Digest, Sha256};

use crate::models::{
    AssetKind, AssetRequest, BrollSlot, GenerationParams, Scene, SceneVariant, VideoPlan,
    VoiceDescriptor,
};

/// Rough speaking rate used for duration hints.
const WORDS_PER_SECOND: f64 = 2.5;

const IMAGE_STYLE: &str = "photorealistic, vertical 9:16, natural light";

/// Longest slice of the slot prompt carried into a b-roll prompt.
const BROLL_SUBJECT_CHARS: usize = 160;

/// Requests grouped by dispatch wave.
#[derive(Debug, Clone, Default)]
pub struct RequestSet {
    /// Narration, voices, portraits, scene visuals and b-roll.
    pub independent: Vec<AssetRequest>,
    /// Talking clips; each needs its line's voice and its speaker's portrait.
    pub talking: Vec<AssetRequest>,
}

impl RequestSet {
    /// Derive all requests for a plan. Ids are deterministic.
    pub fn derive(plan: &VideoPlan) -> Self {
        let mut independent = Vec::new();
        let mut talking = Vec::new();

        let narration = plan.narration_text();
        let mut params = seeded(AssetKind::NarrationAudio, narration.clone());
        params.voice = Some(plan.narrator_voice.clone());
        params.duration_hint_secs = Some(speaking_time(&narration));
        independent.push(AssetRequest::new(AssetKind::NarrationAudio, params));

        for (line, spoken) in plan.spoken_lines.iter().enumerate() {
            let voice = plan
                .character(&spoken.character_id)
                .map(|c| c.voice.clone())
                .unwrap_or_else(VoiceDescriptor::default);
            let hint = speaking_time(&spoken.text);

            let kind = AssetKind::CharacterVoiceAudio { line };
            let mut params = seeded(kind.clone(), spoken.text.clone());
            params.voice = Some(voice);
            params.duration_hint_secs = Some(hint);
            independent.push(AssetRequest::new(kind, params));

            let kind = AssetKind::CharacterTalkingClip {
                character_id: spoken.character_id.clone(),
                line,
            };
            let mut params = seeded(kind.clone(), spoken.text.clone());
            params.duration_hint_secs = Some(hint);
            talking.push(AssetRequest::new(kind, params));
        }

        for character in &plan.characters {
            let kind = AssetKind::CharacterPortrait {
                character_id: character.id.clone(),
            };
            let mut params = seeded(kind.clone(), character.portrait_prompt());
            params.style = IMAGE_STYLE.to_string();
            independent.push(AssetRequest::new(kind, params));
        }

        for (index, scene) in plan.scenes.iter().enumerate() {
            let prompt = scene.effective_visual_prompt();
            let mut variants = vec![(SceneVariant::Primary, prompt.clone())];
            if plan.is_hook_index(index) {
                variants.push((
                    SceneVariant::Hook,
                    format!("{}, dramatic close framing, high contrast", prompt),
                ));
            }
            for (variant, prompt) in variants {
                let kind = AssetKind::SceneVisual {
                    scene_id: scene.id,
                    variant,
                };
                let mut params = seeded(kind.clone(), prompt);
                params.style = IMAGE_STYLE.to_string();
                independent.push(AssetRequest::new(kind, params));
            }

            for (slot, broll) in scene.broll_slots.iter().enumerate() {
                let kind = AssetKind::BrollVisual {
                    scene_id: scene.id,
                    slot,
                };
                let prompt = broll_prompt(scene, broll, plan.is_hook_index(index));
                let mut params = seeded(kind.clone(), prompt);
                params.style = IMAGE_STYLE.to_string();
                params.category = Some(broll.category.clone());
                independent.push(AssetRequest::new(kind, params));
            }
        }

        Self {
            independent,
            talking,
        }
    }

    pub fn len(&self) -> usize {
        self.independent.len() + self.talking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All requests, independent wave first.
    pub fn iter(&self) -> impl Iterator<Item = &AssetRequest> {
        self.independent.iter().chain(self.talking.iter())
    }
}

/// B-roll prompt: the slot's subject, the scene emotion's visual tone, the
/// category's framing and a composition. Hook scenes get dramatic framing.
pub fn broll_prompt(scene: &Scene, slot: &BrollSlot, hook: bool) -> String {
    let subject = if slot.prompt.trim().is_empty() {
        scene.effective_visual_prompt()
    } else {
        slot.prompt.trim().to_string()
    };
    let subject: String = subject.chars().take(BROLL_SUBJECT_CHARS).collect();
    let emotion = scene.emotion.trim();
    let composition = if hook {
        "over-the-shoulder shot, dramatic framing"
    } else {
        "shallow depth of field"
    };

    let mut parts = vec![subject.trim_end().to_string()];
    if !emotion.is_empty() {
        parts.push(format!("{} mood", emotion));
    }
    parts.push(emotion_tone(emotion).to_string());
    if let Some(framing) = category_framing(&slot.category) {
        parts.push(framing.to_string());
    }
    parts.push(format!("cinematic, {}", composition));
    parts.join(", ")
}

/// Visual tone for an emotion tag.
fn emotion_tone(emotion: &str) -> &'static str {
    match emotion.to_ascii_lowercase().as_str() {
        "rage" | "anger" | "angry" | "furious" => {
            "harsh lighting, tense atmosphere, visible anger, clenched jaws"
        }
        "injustice" | "unfair" => {
            "uneasy atmosphere, people avoiding eye contact, moral conflict"
        }
        "shock" | "shocked" | "stunned" => "wide eyes, hands over mouth, stunned expressions",
        "disgust" | "disgusted" => "uneasy body language, uncomfortable expressions, distaste",
        "sadness" | "sad" => "somber lighting, tears, downcast faces",
        "fear" | "afraid" | "scared" => "worried expressions, defensive body language",
        "satisfaction" | "satisfied" | "relieved" | "triumphant" => {
            "triumphant atmosphere, relieved expressions"
        }
        _ => "dramatic lighting, tense atmosphere",
    }
}

/// Shot framing for a b-roll category; None for free-form categories.
fn category_framing(category: &str) -> Option<&'static str> {
    match category {
        "establishing_scene" => Some("wide establishing shot"),
        "mid_shot" => Some("medium shot"),
        "emotional_closeup" => Some("tight close-up on faces"),
        "dramatic_insert" => Some("dramatic insert, detail shot"),
        _ => None,
    }
}

/// Parameters with a seed derived from the request id.
fn seeded(kind: AssetKind, prompt: String) -> GenerationParams {
    GenerationParams::new(prompt, seed_for(&kind.request_id()))
}

/// Stable seed for a request id.
pub fn seed_for(request_id: &str) -> u64 {
    let digest = Sha256::digest(request_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Estimated speaking time for a text, at least one second.
pub fn speaking_time(text: &str) -> f64 {
    (text.split_whitespace().count() as f64 / WORDS_PER_SECOND).max(1.0)
}

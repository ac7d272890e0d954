//! Edit patterns: one scene handler per `EditPattern` variant.
//!
//! A handler decides how a scene with talking clips is cut. Scenes without
//! clips are always narration sub-cuts under the handler's caps, so every
//! handler only has to deal with dialogue.

mod broll_cinematic;
mod default;
mod mixed_rapid;
mod talking_head_heavy;

pub use broll_cinematic::BrollCinematicHandler;
pub use default::DefaultHandler;
pub use mixed_rapid::MixedRapidHandler;
pub use talking_head_heavy::TalkingHeadHeavyHandler;

use crate::config::ComposerSettings;
use crate::models::EditPattern;

use super::builder::{CutCaps, SceneBuilder};
use super::types::{LayerRole, Transition};

/// Transitions a pattern uses, by position in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneTransitions {
    /// First layer of a scene.
    pub boundary: Transition,
    /// Later visual layers.
    pub inner: Transition,
    /// Talking-head layers.
    pub talking: Transition,
}

pub trait SceneHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn transitions(&self) -> SceneTransitions;

    /// Sub-cut caps for visual runs.
    fn caps(&self, config: &ComposerSettings) -> CutCaps {
        CutCaps::uniform(config.still_cap_secs, config.sliver_secs)
    }

    /// Fill a scene that has at least one talking clip.
    fn build_dialogue(&self, scene: &mut SceneBuilder, config: &ComposerSettings);

    /// Fill a scene, narration-only scenes as capped sub-cuts.
    fn build_scene(&self, scene: &mut SceneBuilder, config: &ComposerSettings) {
        if scene.has_clips() {
            self.build_dialogue(scene, config);
        } else {
            let caps = self.caps(config);
            let total = scene.remaining();
            scene.push_visuals(total, LayerRole::NarrationCut, &caps);
        }
    }
}

/// Handler for the given pattern.
pub fn get_handler(pattern: EditPattern) -> Box<dyn SceneHandler> {
    match pattern {
        EditPattern::TalkingHeadHeavy => Box::new(TalkingHeadHeavyHandler),
        EditPattern::BrollCinematic => Box::new(BrollCinematicHandler),
        EditPattern::MixedRapid => Box::new(MixedRapidHandler),
        EditPattern::Default => Box::new(DefaultHandler),
    }
}


#[cfg(test)]
pub(crate) mod testing {
    use crate::models::MediaKind;
    use crate::timeline::builder::{DraftLayer, SceneBuilder, TalkingClip};
    use crate::timeline::types::LayerSource;

    /// Scene 1 starting at `start`, one video clip per entry of `clips`.
    pub fn scene_at(start: f64, duration: f64, clips: &[f64]) -> SceneBuilder {
        let clips = clips
            .iter()
            .enumerate()
            .map(|(line, secs)| TalkingClip {
                line,
                source: LayerSource::Asset {
                    request_id: format!("talking-{}", line),
                    path: format!("talking-{}.mp4", line).into(),
                    media: MediaKind::Video,
                    degraded: false,
                },
                duration_secs: *secs,
            })
            .collect();
        let rotation = ["scene-1", "broll-1-0"]
            .iter()
            .map(|label| LayerSource::Placeholder {
                label: label.to_string(),
            })
            .collect();
        SceneBuilder::detached(1, start, duration, clips, rotation)
    }

    pub fn dialogue_scene(duration: f64, clips: &[f64]) -> SceneBuilder {
        scene_at(0.0, duration, clips)
    }

    pub fn durations_of(drafts: &[DraftLayer]) -> Vec<f64> {
        drafts.iter().map(|d| d.duration_secs).collect()
    }
}

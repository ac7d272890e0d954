//! TalkingHeadHeavy: most of each scene on the speakers.

use super::{SceneHandler, SceneTransitions};
use crate::config::ComposerSettings;
use crate::timeline::builder::SceneBuilder;
use crate::timeline::types::{LayerRole, Transition};

/// Talking heads take `talking_head_share` of the scene in line order;
/// b-roll fills the intro, the gaps between lines and the outro.
pub struct TalkingHeadHeavyHandler;

impl SceneHandler for TalkingHeadHeavyHandler {
    fn name(&self) -> &'static str {
        "talking_head_heavy"
    }

    fn transitions(&self) -> SceneTransitions {
        SceneTransitions {
            boundary: Transition::Fade { secs: 0.5 },
            inner: Transition::Fade { secs: 0.3 },
            talking: Transition::Cut,
        }
    }

    fn build_dialogue(&self, scene: &mut SceneBuilder, config: &ComposerSettings) {
        let caps = self.caps(config);
        let clips = scene.take_clips();
        let per_clip = scene.duration_secs * config.talking_head_share / clips.len() as f64;

        let heads: Vec<f64> = clips.iter().map(|c| c.duration_secs.min(per_clip)).collect();
        let broll = (scene.duration_secs - heads.iter().sum::<f64>()).max(0.0);
        let gap = broll / (clips.len() + 1) as f64;

        for (clip, secs) in clips.iter().zip(heads) {
            scene.push_visuals(gap, LayerRole::Broll, &caps);
            scene.push_talking(clip, secs);
        }
        let rest = scene.remaining();
        scene.push_visuals(rest, LayerRole::Broll, &caps);
    }
}

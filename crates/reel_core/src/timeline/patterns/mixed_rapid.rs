//! MixedRapid: fast alternation with a tighter cap at the start of the video.

use super::{SceneHandler, SceneTransitions};
use crate::config::ComposerSettings;
use crate::timeline::builder::{CutCaps, SceneBuilder};
use crate::timeline::types::{LayerRole, Transition};

pub struct MixedRapidHandler;

impl SceneHandler for MixedRapidHandler {
    fn name(&self) -> &'static str {
        "mixed_rapid"
    }

    fn transitions(&self) -> SceneTransitions {
        SceneTransitions {
            boundary: Transition::Fade { secs: 0.2 },
            inner: Transition::Fade { secs: 0.15 },
            talking: Transition::Cut,
        }
    }

    fn caps(&self, config: &ComposerSettings) -> CutCaps {
        CutCaps {
            cap: config.still_cap_secs,
            early: Some((config.rapid_early_window_secs, config.rapid_early_cap_secs)),
            sliver: config.sliver_secs,
        }
    }

    fn build_dialogue(&self, scene: &mut SceneBuilder, config: &ComposerSettings) {
        let caps = self.caps(config);

        for clip in scene.take_clips() {
            let remaining = scene.remaining();
            if remaining <= config.sliver_secs {
                break;
            }
            let broll = caps.cap_at(scene.now()).min(0.4 * remaining);
            scene.push_visual(broll, LayerRole::Broll);

            let head = caps
                .cap_at(scene.now())
                .min(clip.duration_secs)
                .min(0.6 * remaining);
            scene.push_talking(&clip, head);
        }

        let rest = scene.remaining();
        scene.push_visuals(rest, LayerRole::Broll, &caps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::patterns::testing::scene_at;

    #[test]
    fn early_layers_stay_under_the_early_cap() {
        let mut scene = scene_at(0.0, 12.0, &[5.0]);
        MixedRapidHandler.build_scene(&mut scene, &ComposerSettings::default());
        let drafts = scene.finish(&MixedRapidHandler.caps(&ComposerSettings::default()));

        assert_eq!(drafts[0].role, LayerRole::Broll);
        assert_eq!(drafts[1].role, LayerRole::TalkingHead);

        let mut at = 0.0;
        for draft in &drafts {
            let cap = if at < 10.0 { 2.0 } else { 3.5 };
            assert!(draft.duration_secs <= cap + 1e-9);
            at += draft.duration_secs;
        }
        assert!((at - 12.0).abs() < 1e-9);
    }

    #[test]
    fn late_scenes_use_the_normal_cap() {
        let mut scene = scene_at(30.0, 10.0, &[]);
        MixedRapidHandler.build_scene(&mut scene, &ComposerSettings::default());
        let drafts = scene.finish(&MixedRapidHandler.caps(&ComposerSettings::default()));
        assert_eq!(drafts.len(), 3);
        assert!(drafts.iter().all(|d| d.duration_secs <= 3.5 + 1e-9));
    }
}

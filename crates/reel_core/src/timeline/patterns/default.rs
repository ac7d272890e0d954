//! Default pattern: even alternation of b-roll and talking heads.

use super::{SceneHandler, SceneTransitions};
use crate::config::ComposerSettings;
use crate::timeline::builder::SceneBuilder;
use crate::timeline::types::{LayerRole, Transition};

/// `k` clips give `2k + 1` equal slots: b-roll, head, b-roll, ..., b-roll.
/// A clip shorter than its slot hands the leftover to the next b-roll.
pub struct DefaultHandler;

impl SceneHandler for DefaultHandler {
    fn name(&self) -> &'static str {
        "default"
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
        let slot = scene.duration_secs / (2 * clips.len() + 1) as f64;

        let mut carry = 0.0;
        for clip in &clips {
            scene.push_visuals(slot + carry, LayerRole::Broll, &caps);
            let secs = slot.min(clip.duration_secs);
            scene.push_talking(clip, secs);
            carry = slot - secs;
        }
        let rest = scene.remaining();
        scene.push_visuals(rest, LayerRole::Broll, &caps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::builder::DraftLayer;
    use crate::timeline::patterns::testing::{dialogue_scene, durations_of};

    #[test]
    fn alternates_evenly() {
        let mut scene = dialogue_scene(9.0, &[10.0]);
        DefaultHandler.build_scene(&mut scene, &ComposerSettings::default());
        let drafts: Vec<DraftLayer> = scene.finish(&DefaultHandler.caps(&ComposerSettings::default()));

        let roles: Vec<LayerRole> = drafts.iter().map(|d| d.role).collect();
        assert_eq!(
            roles,
            vec![LayerRole::Broll, LayerRole::TalkingHead, LayerRole::Broll]
        );
        assert!(durations_of(&drafts).iter().all(|d| (d - 3.0).abs() < 1e-9));
    }

    #[test]
    fn short_clip_leftover_goes_to_next_broll() {
        let mut scene = dialogue_scene(9.0, &[1.0]);
        DefaultHandler.build_scene(&mut scene, &ComposerSettings::default());
        let drafts = scene.finish(&DefaultHandler.caps(&ComposerSettings::default()));
        let durations = durations_of(&drafts);

        assert!((durations[1] - 1.0).abs() < 1e-9);
        // 5 s of trailing b-roll splits under the 3.5 s cap.
        assert_eq!(drafts.len(), 4);
        assert!((durations[2] - 2.5).abs() < 1e-9);
        assert!((durations.iter().sum::<f64>() - 9.0).abs() < 1e-9);
    }
}

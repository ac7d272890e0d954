//! BrollCinematic: long b-roll shots, at most one talking head per scene.

use super::{SceneHandler, SceneTransitions};
use crate::config::ComposerSettings;
use crate::timeline::builder::SceneBuilder;
use crate::timeline::types::{LayerRole, Transition};

/// Inserts shorter than this are dropped.
const MIN_INSERT_SECS: f64 = 0.5;

pub struct BrollCinematicHandler;

impl BrollCinematicHandler {
    /// Segments of about `cinematic_segment_secs`, none longer than the max.
    fn segments(scene: &mut SceneBuilder, total: f64, config: &ComposerSettings) {
        if total <= 0.0 {
            return;
        }
        let mut n = (total / config.cinematic_segment_secs).round().max(1.0) as usize;
        while total / n as f64 > config.cinematic_segment_max_secs + 1e-9 {
            n += 1;
        }
        for _ in 0..n {
            scene.push_visual(total / n as f64, LayerRole::Broll);
        }
    }
}

impl SceneHandler for BrollCinematicHandler {
    fn name(&self) -> &'static str {
        "broll_cinematic"
    }

    fn transitions(&self) -> SceneTransitions {
        SceneTransitions {
            boundary: Transition::Crossfade { secs: 0.5 },
            inner: Transition::Crossfade { secs: 0.4 },
            talking: Transition::Crossfade { secs: 0.3 },
        }
    }

    fn build_dialogue(&self, scene: &mut SceneBuilder, config: &ComposerSettings) {
        let duration = scene.duration_secs;
        let insert = scene.take_clips().into_iter().next().and_then(|clip| {
            let secs = config
                .cinematic_talking_cap_secs
                .min(config.cinematic_talking_share * duration)
                .min(clip.duration_secs);
            (secs >= MIN_INSERT_SECS).then_some((clip, secs))
        });

        match insert {
            Some((clip, secs)) => {
                Self::segments(scene, (duration - secs) / 2.0, config);
                scene.push_talking(&clip, secs);
                let rest = scene.remaining();
                Self::segments(scene, rest, config);
            }
            None => Self::segments(scene, duration, config),
        }
    }
}

//! Timeline composition.

use crate::config::{ComposerSettings, ExtensionMode, Settings, TimingSettings};
use crate::models::{AssetMap, VideoPlan};
use crate::reconcile::{DurationAction, Reconciliation};

use super::audio::{AudioComposer, SceneSpan};
use super::builder::SceneBuilder;
use super::error::{CompositionError, CompositionResult};
use super::patterns::get_handler;
use super::types::{describe_layers, Layer, LayerRole, Motion, Pan, Timeline, Transition};
use crate::assets::placeholder::{FRAME_HEIGHT, FRAME_WIDTH};

const CONTIGUITY_EPS: f64 = 1e-6;

pub struct TimelineComposer {
    config: ComposerSettings,
    timing: TimingSettings,
}

impl TimelineComposer {
    pub fn new(config: ComposerSettings, timing: TimingSettings) -> Self {
        Self { config, timing }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.composer.clone(), settings.timing.clone())
    }

    /// Lay out every scene with the plan's edit pattern and build the
    /// soundtrack. The result always satisfies the timeline invariants.
    pub fn compose(
        &self,
        plan: &VideoPlan,
        reconciliation: &Reconciliation,
        assets: &AssetMap,
    ) -> CompositionResult<Timeline> {
        let handler = get_handler(plan.edit_pattern);
        let transitions = handler.transitions();
        let caps = handler.caps(&self.config);

        let mut layers: Vec<Layer> = Vec::new();
        let mut spans: Vec<SceneSpan> = Vec::with_capacity(plan.scenes.len());
        let mut scene_start = 0.0;
        let mut cursor = 0.0;

        for (index, scene) in plan.scenes.iter().enumerate() {
            let duration = reconciliation
                .scene_duration(scene.id)
                .ok_or(CompositionError::MissingScene(scene.id))?;
            let mut builder = SceneBuilder::new(plan, index, scene_start, duration, assets)
                .ok_or(CompositionError::MissingScene(scene.id))?;

            handler.build_scene(&mut builder, &self.config);

            for (position, draft) in builder.finish(&caps).into_iter().enumerate() {
                let transition = if position == 0 {
                    transitions.boundary
                } else if draft.role == LayerRole::TalkingHead {
                    transitions.talking
                } else {
                    transitions.inner
                };
                let index = layers.len();
                let motion = draft.source.is_still().then(|| self.ken_burns(index));

                layers.push(Layer {
                    index,
                    scene_id: scene.id,
                    start_secs: cursor,
                    duration_secs: draft.duration_secs,
                    transition: transition.clamped(draft.duration_secs / 2.0),
                    source: draft.source,
                    role: draft.role,
                    motion,
                    line: draft.line,
                });
                cursor += draft.duration_secs;
            }

            spans.push((scene.id, scene_start, duration));
            scene_start += duration;
        }

        if let Some(first) = layers.first_mut() {
            first.transition = Transition::Cut;
        }

        let extension = match reconciliation.action {
            DurationAction::Extend { mode, .. } => mode,
            _ => self.timing.extension,
        };
        let audio = AudioComposer::new(plan, assets, extension, self.timing.loop_tail_secs)
            .compose(&layers, &spans, reconciliation.final_secs);

        let timeline = Timeline {
            episode_id: plan.episode_id.clone(),
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            final_duration_secs: reconciliation.final_secs,
            layers,
            audio,
        };

        if let Err(e) = self.check(&timeline) {
            tracing::error!(episode = %plan.episode_id, "{}", e);
            return Err(e);
        }

        tracing::info!(
            episode = %plan.episode_id,
            pattern = handler.name(),
            layers = timeline.layers.len(),
            audio_segments = timeline.audio.segments.len(),
            duration_secs = timeline.final_duration_secs,
            extension = extension_label(extension),
            "timeline composed"
        );
        Ok(timeline)
    }

    fn ken_burns(&self, index: usize) -> Motion {
        Motion::KenBurns {
            start_scale: 1.0,
            end_scale: 1.0 + self.config.zoom_amount,
            pan: Pan::for_index(index),
        }
    }

    /// Contiguity and total-duration invariants.
    pub fn check(&self, timeline: &Timeline) -> CompositionResult<()> {
        let tolerance = self.timing.composition_tolerance_secs;
        let final_secs = timeline.final_duration_secs;

        let mut expected_start = 0.0;
        for layer in &timeline.layers {
            if (layer.start_secs - expected_start).abs() > CONTIGUITY_EPS {
                return Err(CompositionError::invariant(
                    "layers contiguous",
                    expected_start,
                    layer.start_secs,
                    timeline.breakdown(),
                ));
            }
            if layer.duration_secs <= 0.0 {
                return Err(CompositionError::invariant(
                    "layer duration positive",
                    0.0,
                    layer.duration_secs,
                    describe_layers(std::slice::from_ref(layer)),
                ));
            }
            expected_start = layer.end_secs();
        }

        let total = timeline.total_secs();
        if timeline.layers.is_empty() || (total - final_secs).abs() > tolerance {
            return Err(CompositionError::invariant(
                "layer total",
                final_secs,
                total,
                timeline.breakdown(),
            ));
        }

        let audio_total = timeline.audio.total_secs();
        if (audio_total - final_secs).abs() > tolerance {
            return Err(CompositionError::invariant(
                "audio total",
                final_secs,
                audio_total,
                timeline.breakdown(),
            ));
        }

        Ok(())
    }
}

fn extension_label(mode: ExtensionMode) -> &'static str {
    match mode {
        ExtensionMode::LoopTail => "loop_tail",
        ExtensionMode::PadSilence => "pad_silence",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::RequestSet;
    use crate::models::fixtures::{dialogue_plan, narration_only_plan};
    use crate::models::{
        AssetFile, AssetKind, AssetOutcome, AssetResult, CharacterSpokenLine, EditPattern,
        FallbackSource, MediaKind,
    };
    use proptest::prelude::*;
    use crate::reconcile::{DurationReconciler, SceneDuration};
    use crate::timeline::types::LayerSource;

    /// Every request resolved with a fake file.
    fn assets_for(plan: &VideoPlan, narration_secs: f64) -> AssetMap {
        let requests = RequestSet::derive(plan);
        requests
            .iter()
            .map(|request| {
                let media = request.kind.media();
                let mut file = AssetFile::new(format!("{}.{}", request.id, media.extension()), media);
                file.duration_secs = match &request.kind {
                    AssetKind::NarrationAudio => Some(narration_secs),
                    AssetKind::CharacterVoiceAudio { .. } => Some(2.0),
                    AssetKind::CharacterTalkingClip { .. } => Some(2.5),
                    _ => None,
                };
                let result = AssetResult {
                    request_id: request.id.clone(),
                    kind: request.kind.clone(),
                    outcome: AssetOutcome::Resolved { file },
                    attempts: 1,
                    quality_score: None,
                    elapsed_ms: 1,
                    reused: false,
                };
                (request.id.clone(), result)
            })
            .collect()
    }

    fn reconcile(plan: &VideoPlan, narration_secs: f64) -> Reconciliation {
        DurationReconciler::new(&TimingSettings::default())
            .reconcile(narration_secs, plan.target_runtime_secs, &plan.scene_weights())
            .unwrap()
    }

    fn composer() -> TimelineComposer {
        TimelineComposer::new(ComposerSettings::default(), TimingSettings::default())
    }

    #[test]
    fn every_pattern_matches_the_final_duration() {
        for pattern in EditPattern::all() {
            for (narration, plan) in [
                (45.0, dialogue_plan(5, 45.0, *pattern)),
                (30.0, dialogue_plan(3, 60.0, *pattern)),
                (75.0, dialogue_plan(4, 50.0, *pattern)),
                (20.0, {
                    let mut p = narration_only_plan(6, 20.0);
                    p.edit_pattern = *pattern;
                    p
                }),
            ] {
                let reconciliation = reconcile(&plan, narration);
                let timeline = composer()
                    .compose(&plan, &reconciliation, &assets_for(&plan, narration))
                    .unwrap();

                assert!(
                    (timeline.total_secs() - reconciliation.final_secs).abs() <= 0.3,
                    "{:?}: {}",
                    pattern,
                    timeline.breakdown()
                );
                assert!((timeline.audio.total_secs() - reconciliation.final_secs).abs() <= 0.3);
                assert_eq!(timeline.layers[0].transition, Transition::Cut);
                assert!(timeline
                    .layers
                    .iter()
                    .all(|l| l.duration_secs >= 0.25 - 1e-9 || timeline.layers_for_scene(l.scene_id).count() == 1));
            }
        }
    }

    #[test]
    fn rapid_narration_only_scenario() {
        let mut plan = narration_only_plan(4, 60.0);
        plan.edit_pattern = EditPattern::MixedRapid;
        let reconciliation = reconcile(&plan, 60.0);
        let timeline = composer()
            .compose(&plan, &reconciliation, &assets_for(&plan, 60.0))
            .unwrap();

        assert!((timeline.total_secs() - 60.0).abs() <= 0.3);
        assert!(timeline.layers.iter().all(|l| l.role == LayerRole::NarrationCut));
        assert!(timeline.layers.iter().all(|l| l.duration_secs <= 3.5 + 1e-9));
        assert!(timeline
            .layers
            .iter()
            .filter(|l| l.start_secs < 10.0)
            .all(|l| l.duration_secs <= 2.0 + 1e-9));
        assert_eq!(timeline.layers[0].source.label(), "scene-1-hook");
        assert!(timeline.layers.iter().all(|l| l.motion.is_some()));
    }

    #[test]
    fn video_layers_get_no_motion() {
        let plan = dialogue_plan(2, 20.0, EditPattern::TalkingHeadHeavy);
        let timeline = composer()
            .compose(&plan, &reconcile(&plan, 20.0), &assets_for(&plan, 20.0))
            .unwrap();

        let heads: Vec<&Layer> = timeline
            .layers
            .iter()
            .filter(|l| l.role == LayerRole::TalkingHead)
            .collect();
        assert_eq!(heads.len(), 2);
        assert!(heads.iter().all(|l| l.motion.is_none()));
        assert_eq!(heads[0].line, Some(0));
    }

    #[test]
    fn portrait_stand_in_gets_a_zoom() {
        let plan = dialogue_plan(1, 10.0, EditPattern::Default);
        let mut assets = assets_for(&plan, 10.0);
        let talking = assets.get_mut("talking-0").unwrap();
        talking.outcome = AssetOutcome::Fallback {
            file: AssetFile::new("portrait-judge.png", MediaKind::Image).with_duration(2.0),
            source: FallbackSource::StaticPortrait,
            reason: "lip-sync unavailable".into(),
        };

        let timeline = composer()
            .compose(&plan, &reconcile(&plan, 10.0), &assets)
            .unwrap();
        let head = timeline
            .layers
            .iter()
            .find(|l| l.role == LayerRole::TalkingHead)
            .unwrap();
        assert!(matches!(head.motion, Some(Motion::KenBurns { .. })));
        assert!(matches!(head.source, LayerSource::Asset { degraded: true, .. }));
    }

    #[test]
    fn missing_scene_duration_is_an_error() {
        let plan = narration_only_plan(2, 10.0);
        let mut reconciliation = reconcile(&plan, 10.0);
        reconciliation.scenes.pop();
        let err = composer()
            .compose(&plan, &reconciliation, &assets_for(&plan, 10.0))
            .unwrap_err();
        assert_eq!(err, CompositionError::MissingScene(2));
    }

    #[test]
    fn drift_beyond_tolerance_is_an_invariant_violation() {
        let plan = narration_only_plan(2, 10.0);
        let mut reconciliation = reconcile(&plan, 10.0);
        reconciliation.scenes = vec![
            SceneDuration {
                scene_id: 1,
                duration_secs: 2.0,
            },
            SceneDuration {
                scene_id: 2,
                duration_secs: 2.0,
            },
        ];
        let err = composer()
            .compose(&plan, &reconciliation, &assets_for(&plan, 10.0))
            .unwrap_err();
        match err {
            CompositionError::InvariantViolation { what, breakdown, .. } => {
                assert_eq!(what, "layer total");
                assert!(breakdown.contains("scene-1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[derive(Debug, Clone)]
    struct Shape {
        pattern: EditPattern,
        target: f64,
        narration: f64,
        lines_per_scene: Vec<usize>,
        clip_secs: Vec<f64>,
    }

    fn shape() -> impl Strategy<Value = Shape> {
        (0usize..4, 1usize..9, 8.0f64..90.0, 0.4f64..1.8).prop_flat_map(
            |(pattern, scenes, target, ratio)| {
                (
                    proptest::collection::vec(0usize..4, scenes),
                    proptest::collection::vec(0.3f64..6.0, scenes * 3),
                )
                    .prop_map(move |(lines_per_scene, clip_secs)| Shape {
                        pattern: EditPattern::all()[pattern],
                        target,
                        narration: target * ratio,
                        lines_per_scene,
                        clip_secs,
                    })
            },
        )
    }

    /// Plan and assets for a shape, talking clips of the drawn lengths.
    fn build(shape: &Shape) -> (VideoPlan, AssetMap) {
        let scenes = shape.lines_per_scene.len() as u32;
        let mut plan = dialogue_plan(scenes, shape.target, shape.pattern);
        plan.spoken_lines = shape
            .lines_per_scene
            .iter()
            .enumerate()
            .flat_map(|(index, count)| {
                (0..*count).map(move |n| CharacterSpokenLine {
                    character_id: if n % 2 == 0 { "judge" } else { "defendant" }.to_string(),
                    text: "Order in my court.".to_string(),
                    emotion: "stern".to_string(),
                    timing_hint_secs: n as f64,
                    scene_id: index as u32 + 1,
                })
            })
            .collect();

        let mut assets = assets_for(&plan, shape.narration);
        for result in assets.values_mut() {
            let line = match &result.kind {
                AssetKind::CharacterTalkingClip { line, .. } => *line,
                _ => continue,
            };
            if let AssetOutcome::Resolved { file } = &mut result.outcome {
                file.duration_secs = Some(shape.clip_secs[line % shape.clip_secs.len()]);
            }
        }
        (plan, assets)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn layouts_hold_their_invariants(shape in shape()) {
            let (plan, assets) = build(&shape);
            let config = ComposerSettings::default();
            let reconciliation = reconcile(&plan, shape.narration);
            let timeline = composer().compose(&plan, &reconciliation, &assets).unwrap();

            prop_assert!((timeline.total_secs() - reconciliation.final_secs).abs() <= 0.3);
            prop_assert!((timeline.audio.total_secs() - reconciliation.final_secs).abs() <= 0.3);

            let mut expected_start = 0.0;
            for layer in &timeline.layers {
                prop_assert!((layer.start_secs - expected_start).abs() < 1e-6, "{}", timeline.breakdown());
                expected_start = layer.end_secs();

                if layer.role == LayerRole::NarrationCut {
                    prop_assert!(layer.duration_secs <= config.still_cap_secs + 1e-6, "{}", timeline.breakdown());
                }
                if shape.pattern == EditPattern::MixedRapid
                    && layer.start_secs < config.rapid_early_window_secs - 1e-6
                {
                    prop_assert!(
                        layer.duration_secs <= config.rapid_early_cap_secs + 1e-6,
                        "{}",
                        timeline.breakdown()
                    );
                }
            }
        }
    }

    #[test]
    fn rapid_scene_ending_just_past_the_window() {
        let mut plan = narration_only_plan(4, 40.4);
        plan.edit_pattern = EditPattern::MixedRapid;
        let timeline = composer()
            .compose(&plan, &reconcile(&plan, 40.4), &assets_for(&plan, 40.4))
            .unwrap();

        let over: Vec<(f64, f64)> = timeline
            .layers
            .iter()
            .filter(|l| l.start_secs < 10.0 - 1e-6 && l.duration_secs > 2.0 + 1e-9)
            .map(|l| (l.start_secs, l.duration_secs))
            .collect();
        assert!(over.is_empty(), "{:?}", over);
        assert!(timeline.layers.iter().all(|l| l.duration_secs >= 0.25));
    }
}

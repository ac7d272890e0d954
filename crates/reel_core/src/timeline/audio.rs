//! Composite soundtrack: character voices anchored on the timeline,
//! narration filling everything else.

use std::path::PathBuf;

use crate::config::ExtensionMode;
use crate::models::{AssetKind, AssetMap, SceneId, VideoPlan};

use super::types::{AudioSegment, AudioSource, CompositeAudio, Layer};

const EPS: f64 = 1e-9;

/// Where each scene sits in the video: `(scene_id, start, duration)`.
pub type SceneSpan = (SceneId, f64, f64);

#[derive(Debug, Clone)]
struct VoiceClip {
    line: usize,
    path: PathBuf,
    anchor: f64,
    duration: f64,
}

struct NarrationTrack {
    path: PathBuf,
    duration: f64,
}

pub struct AudioComposer<'a> {
    plan: &'a VideoPlan,
    assets: &'a AssetMap,
    extension: ExtensionMode,
    loop_tail_secs: f64,
}

impl<'a> AudioComposer<'a> {
    pub fn new(
        plan: &'a VideoPlan,
        assets: &'a AssetMap,
        extension: ExtensionMode,
        loop_tail_secs: f64,
    ) -> Self {
        Self {
            plan,
            assets,
            extension,
            loop_tail_secs,
        }
    }

    /// Build audio covering `[0, final_secs)` exactly.
    pub fn compose(&self, layers: &[Layer], scenes: &[SceneSpan], final_secs: f64) -> CompositeAudio {
        let narration = self.narration();
        let mut fill = NarrationFill {
            narration: narration.as_ref(),
            consumed: 0.0,
            extension: self.extension,
            loop_tail_secs: self.loop_tail_secs,
            segments: Vec::new(),
        };

        let mut cursor = 0.0;
        for voice in self.placed_voices(layers, scenes, final_secs) {
            fill.gap(cursor, voice.anchor);
            fill.segments.push(AudioSegment {
                start_secs: voice.anchor,
                duration_secs: voice.duration,
                source: AudioSource::File { path: voice.path },
                offset_secs: 0.0,
                line: Some(voice.line),
            });
            cursor = voice.anchor + voice.duration;
        }
        fill.gap(cursor, final_secs);

        CompositeAudio {
            segments: fill.segments,
        }
    }

    fn narration(&self) -> Option<NarrationTrack> {
        let result = self.assets.get(&AssetKind::NarrationAudio.request_id())?;
        let file = result.usable_file()?;
        let duration = file.duration_secs.filter(|d| *d > EPS)?;
        Some(NarrationTrack {
            path: file.path.clone(),
            duration,
        })
    }

    /// Genuine voice clips, anchored and pushed apart so none overlap.
    fn placed_voices(&self, layers: &[Layer], scenes: &[SceneSpan], final_secs: f64) -> Vec<VoiceClip> {
        let mut voices: Vec<VoiceClip> = self
            .plan
            .spoken_lines
            .iter()
            .enumerate()
            .filter_map(|(line, spoken)| {
                let request_id = AssetKind::CharacterVoiceAudio { line }.request_id();
                let file = self.assets.get(&request_id)?.genuine_file()?;
                let duration = file.duration_secs.filter(|d| *d > EPS)?;

                let anchor = layers
                    .iter()
                    .find(|l| l.line == Some(line))
                    .map(|l| l.start_secs)
                    .or_else(|| {
                        scenes
                            .iter()
                            .find(|(id, _, _)| *id == spoken.scene_id)
                            .map(|(_, start, len)| start + spoken.timing_hint_secs.clamp(0.0, *len))
                    })?;

                Some(VoiceClip {
                    line,
                    path: file.path.clone(),
                    anchor,
                    duration,
                })
            })
            .collect();

        voices.sort_by(|a, b| a.anchor.total_cmp(&b.anchor));

        let mut placed = Vec::with_capacity(voices.len());
        let mut cursor = 0.0;
        for mut voice in voices {
            voice.anchor = voice.anchor.max(cursor);
            if voice.anchor >= final_secs - EPS {
                tracing::debug!(line = voice.line, "voice clip falls past the end, dropped");
                continue;
            }
            voice.duration = voice.duration.min(final_secs - voice.anchor);
            cursor = voice.anchor + voice.duration;
            placed.push(voice);
        }
        placed
    }
}

struct NarrationFill<'n> {
    narration: Option<&'n NarrationTrack>,
    consumed: f64,
    extension: ExtensionMode,
    loop_tail_secs: f64,
    segments: Vec<AudioSegment>,
}

impl NarrationFill<'_> {
    fn gap(&mut self, from: f64, to: f64) {
        let mut at = from;

        if let Some(track) = self.narration {
            let take = (to - at).min(track.duration - self.consumed);
            if take > EPS {
                self.push(at, take, AudioSource::File { path: track.path.clone() }, self.consumed);
                self.consumed += take;
                at += take;
            }

            if self.extension == ExtensionMode::LoopTail {
                let tail = self.loop_tail_secs.min(track.duration).max(EPS);
                let offset = track.duration - tail;
                while to - at > EPS {
                    let take = (to - at).min(tail);
                    self.push(at, take, AudioSource::File { path: track.path.clone() }, offset);
                    at += take;
                }
            }
        }

        if to - at > EPS {
            self.push(at, to - at, AudioSource::Silence, 0.0);
        }
    }

    fn push(&mut self, start: f64, duration: f64, source: AudioSource, offset: f64) {
        self.segments.push(AudioSegment {
            start_secs: start,
            duration_secs: duration,
            source,
            offset_secs: offset,
            line: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::dialogue_plan;
    use crate::models::{AssetFile, AssetOutcome, AssetResult, EditPattern, MediaKind};

    fn audio_result(kind: AssetKind, secs: f64) -> AssetResult {
        AssetResult {
            request_id: kind.request_id(),
            outcome: AssetOutcome::Resolved {
                file: AssetFile::new(format!("{}.wav", kind.request_id()), MediaKind::Audio)
                    .with_duration(secs),
            },
            kind,
            attempts: 1,
            quality_score: None,
            elapsed_ms: 1,
            reused: false,
        }
    }

    fn assert_contiguous(audio: &CompositeAudio, total: f64) {
        let mut at = 0.0;
        for seg in &audio.segments {
            assert!((seg.start_secs - at).abs() < 1e-6, "gap at {}", at);
            at += seg.duration_secs;
        }
        assert!((at - total).abs() < 1e-6);
    }

    #[test]
    fn voices_anchor_on_hints_and_narration_fills_gaps() {
        let plan = dialogue_plan(2, 20.0, EditPattern::Default);
        let mut assets = AssetMap::new();
        for result in [
            audio_result(AssetKind::NarrationAudio, 30.0),
            audio_result(AssetKind::CharacterVoiceAudio { line: 0 }, 2.0),
            audio_result(AssetKind::CharacterVoiceAudio { line: 1 }, 2.0),
        ] {
            assets.insert(result.request_id.clone(), result);
        }

        let scenes = [(1, 0.0, 10.0), (2, 10.0, 10.0)];
        let audio = AudioComposer::new(&plan, &assets, ExtensionMode::LoopTail, 4.0)
            .compose(&[], &scenes, 20.0);

        assert_contiguous(&audio, 20.0);
        let voices: Vec<_> = audio.segments.iter().filter(|s| s.line.is_some()).collect();
        assert_eq!(voices.len(), 2);
        assert!((voices[0].start_secs - 1.0).abs() < 1e-9);
        assert!((voices[1].start_secs - 11.0).abs() < 1e-9);
        // Narration resumes where it left off after each voice.
        assert!((audio.segments[2].offset_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn short_narration_loops_its_tail() {
        let plan = dialogue_plan(1, 10.0, EditPattern::Default);
        let mut assets = AssetMap::new();
        let narration = audio_result(AssetKind::NarrationAudio, 5.0);
        assets.insert(narration.request_id.clone(), narration);

        let audio = AudioComposer::new(&plan, &assets, ExtensionMode::LoopTail, 2.0)
            .compose(&[], &[(1, 0.0, 10.0)], 10.0);
        assert_contiguous(&audio, 10.0);
        assert!(audio.segments[1..]
            .iter()
            .all(|s| (s.offset_secs - 3.0).abs() < 1e-9 && s.source != AudioSource::Silence));
    }

    #[test]
    fn pad_mode_and_missing_narration_use_silence() {
        let plan = dialogue_plan(1, 10.0, EditPattern::Default);
        let audio = AudioComposer::new(&plan, &AssetMap::new(), ExtensionMode::PadSilence, 4.0)
            .compose(&[], &[(1, 0.0, 10.0)], 10.0);
        assert_eq!(audio.segments.len(), 1);
        assert_eq!(audio.segments[0].source, AudioSource::Silence);
        assert_contiguous(&audio, 10.0);
    }
}

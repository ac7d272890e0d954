//! Per-scene layer drafting.
//!
//! A `SceneBuilder` is filled by one pattern handler. It hands out visuals
//! in rotation, tracks how much of the scene is used, and produces draft
//! layers that the composer turns into the final timeline.

use crate::assets::speaking_time;
use crate::models::{AssetKind, AssetMap, SceneId, SceneVariant, VideoPlan};

use super::types::{LayerRole, LayerSource};

const EPS: f64 = 1e-9;

/// A talking-head clip (or the portrait standing in for one).
#[derive(Debug, Clone)]
pub struct TalkingClip {
    pub line: usize,
    pub source: LayerSource,
    pub duration_secs: f64,
}

#[derive(Debug, Clone)]
pub struct DraftLayer {
    pub duration_secs: f64,
    pub source: LayerSource,
    pub role: LayerRole,
    pub line: Option<usize>,
}

/// Cap on sub-cut length, optionally tighter early in the video.
#[derive(Debug, Clone, Copy)]
pub struct CutCaps {
    pub cap: f64,
    /// `(until_secs, cap)` applied to layers starting before `until_secs`.
    pub early: Option<(f64, f64)>,
    pub sliver: f64,
}

impl CutCaps {
    pub fn uniform(cap: f64, sliver: f64) -> Self {
        Self {
            cap,
            early: None,
            sliver,
        }
    }

    pub fn cap_at(&self, at_secs: f64) -> f64 {
        match self.early {
            Some((until, early_cap)) if at_secs < until - EPS => early_cap.min(self.cap),
            _ => self.cap,
        }
    }

    /// Cap in force at `at_secs` and where that regime ends.
    fn regime(&self, at_secs: f64) -> (f64, f64) {
        match self.early {
            Some((until, early_cap)) if at_secs < until - EPS => (early_cap.min(self.cap), until),
            _ => (self.cap, f64::INFINITY),
        }
    }

    /// Lengths covering `total` seconds from `start`, balanced within each regime.
    ///
    /// A stretch shorter than `sliver` on either side of a regime boundary
    /// is folded into the neighbouring span before it is divided, so no
    /// piece is a sliver and none outgrows the cap where it starts.
    pub fn lengths(&self, start: f64, total: f64) -> Vec<f64> {
        let mut lengths = Vec::new();
        let end = start + total;
        let mut at = start;

        while end - at > EPS {
            let (cap, horizon) = self.regime(at);
            let mut span = horizon.min(end) - at;
            if span < self.sliver {
                span = (end - at).min(cap);
            }
            if end - (at + span) < self.sliver {
                span = end - at;
            }
            let n = balanced_count(span, cap);
            let len = span / n as f64;
            lengths.extend(std::iter::repeat(len).take(n));
            at += span;
        }

        lengths
    }
}

/// Fewest equal pieces of `total` that each fit under `cap`.
pub fn balanced_count(total: f64, cap: f64) -> usize {
    if cap <= EPS {
        return 1;
    }
    ((total / cap) - EPS).ceil().max(1.0) as usize
}

/// Scene visuals handed out in rotation, hook variant first.
#[derive(Debug, Clone)]
struct VisualPool {
    hook: Option<LayerSource>,
    rotation: Vec<LayerSource>,
    next: usize,
    fallback_label: String,
}

impl VisualPool {
    fn next(&mut self) -> LayerSource {
        if let Some(hook) = self.hook.take() {
            return hook;
        }
        if self.rotation.is_empty() {
            return LayerSource::Placeholder {
                label: self.fallback_label.clone(),
            };
        }
        let source = self.rotation[self.next % self.rotation.len()].clone();
        self.next += 1;
        source
    }
}

/// Layer source for a request, or `None` if nothing usable exists on disk.
pub(crate) fn asset_source(assets: &AssetMap, request_id: &str) -> Option<LayerSource> {
    let result = assets.get(request_id)?;
    let file = result.usable_file()?;
    Some(LayerSource::Asset {
        request_id: request_id.to_string(),
        path: file.path.clone(),
        media: file.media,
        degraded: !result.is_resolved(),
    })
}

pub struct SceneBuilder {
    pub scene_id: SceneId,
    pub start_secs: f64,
    pub duration_secs: f64,
    clips: Vec<TalkingClip>,
    visuals: VisualPool,
    drafts: Vec<DraftLayer>,
    elapsed: f64,
}

impl SceneBuilder {
    /// Gather the clips and visuals available to scene `index` of `plan`.
    pub fn new(
        plan: &VideoPlan,
        index: usize,
        start_secs: f64,
        duration_secs: f64,
        assets: &AssetMap,
    ) -> Option<Self> {
        let scene = plan.scenes.get(index)?;

        let clips = plan
            .lines_for_scene(scene.id)
            .filter_map(|(line, spoken)| {
                let character_id = spoken.character_id.clone();
                let request_id = AssetKind::CharacterTalkingClip { character_id, line }.request_id();
                let source = asset_source(assets, &request_id)?;
                let duration_secs = assets
                    .get(&request_id)
                    .and_then(|r| r.usable_file())
                    .and_then(|f| f.duration_secs)
                    .filter(|d| *d > 0.0)
                    .unwrap_or_else(|| speaking_time(&spoken.text));
                Some(TalkingClip {
                    line,
                    source,
                    duration_secs,
                })
            })
            .collect();

        let hook = if plan.is_hook_index(index) {
            let id = AssetKind::SceneVisual {
                scene_id: scene.id,
                variant: SceneVariant::Hook,
            }
            .request_id();
            asset_source(assets, &id)
        } else {
            None
        };

        let mut rotation: Vec<LayerSource> = Vec::new();
        let primary = AssetKind::SceneVisual {
            scene_id: scene.id,
            variant: SceneVariant::Primary,
        };
        rotation.extend(asset_source(assets, &primary.request_id()));
        for slot in 0..scene.broll_slots.len() {
            let id = AssetKind::BrollVisual {
                scene_id: scene.id,
                slot,
            }
            .request_id();
            rotation.extend(asset_source(assets, &id));
        }

        Some(Self {
            scene_id: scene.id,
            start_secs,
            duration_secs,
            clips,
            visuals: VisualPool {
                hook,
                rotation,
                next: 0,
                fallback_label: primary.request_id(),
            },
            drafts: Vec::new(),
            elapsed: 0.0,
        })
    }

    /// Builder with explicit clips and visuals, outside any plan.
    #[cfg(test)]
    pub(crate) fn detached(
        scene_id: SceneId,
        start_secs: f64,
        duration_secs: f64,
        clips: Vec<TalkingClip>,
        rotation: Vec<LayerSource>,
    ) -> Self {
        Self {
            scene_id,
            start_secs,
            duration_secs,
            clips,
            visuals: VisualPool {
                hook: None,
                rotation,
                next: 0,
                fallback_label: format!("scene-{}", scene_id),
            },
            drafts: Vec::new(),
            elapsed: 0.0,
        }
    }

    pub fn has_clips(&self) -> bool {
        !self.clips.is_empty()
    }

    pub fn take_clips(&mut self) -> Vec<TalkingClip> {
        std::mem::take(&mut self.clips)
    }

    pub fn remaining(&self) -> f64 {
        (self.duration_secs - self.elapsed).max(0.0)
    }

    /// Absolute time in the video where the next layer starts.
    pub fn now(&self) -> f64 {
        self.start_secs + self.elapsed
    }

    /// One visual layer of exactly `secs`.
    pub fn push_visual(&mut self, secs: f64, role: LayerRole) {
        if secs <= EPS {
            return;
        }
        let source = self.visuals.next();
        self.push(DraftLayer {
            duration_secs: secs,
            source,
            role,
            line: None,
        });
    }

    /// Visual sub-cuts covering `total` seconds under `caps`.
    pub fn push_visuals(&mut self, total: f64, role: LayerRole, caps: &CutCaps) {
        for secs in caps.lengths(self.now(), total.min(self.remaining())) {
            self.push_visual(secs, role);
        }
    }

    pub fn push_talking(&mut self, clip: &TalkingClip, secs: f64) {
        if secs <= EPS {
            return;
        }
        self.push(DraftLayer {
            duration_secs: secs,
            source: clip.source.clone(),
            role: LayerRole::TalkingHead,
            line: Some(clip.line),
        });
    }

    fn push(&mut self, draft: DraftLayer) {
        self.elapsed += draft.duration_secs;
        self.drafts.push(draft);
    }

    /// Drafts for the scene, summing to its duration, without slivers.
    pub fn finish(mut self, caps: &CutCaps) -> Vec<DraftLayer> {
        let left = self.duration_secs - self.elapsed;
        if self.drafts.is_empty() {
            self.elapsed = 0.0;
            self.push_visuals(self.duration_secs, LayerRole::NarrationCut, caps);
        } else if left > EPS {
            let role = match self.drafts.iter().rev().find(|d| d.role != LayerRole::TalkingHead) {
                Some(draft) => draft.role,
                None => LayerRole::Broll,
            };
            self.push_visuals(left, role, caps);
        } else if left < -EPS {
            if let Some(last) = self.drafts.last_mut() {
                last.duration_secs = (last.duration_secs + left).max(EPS);
            }
        }
        absorb_slivers(self.drafts, self.start_secs, caps)
    }
}

/// Lengthen `layer` by `extra`. If that would push a layer that honoured
/// `cap` past it, the layer is halved instead and the second half returned.
fn grow(layer: &mut DraftLayer, extra: f64, cap: f64) -> Option<DraftLayer> {
    let combined = layer.duration_secs + extra;
    if combined <= cap + EPS || layer.duration_secs > cap + EPS {
        layer.duration_secs = combined;
        return None;
    }
    layer.duration_secs = combined / 2.0;
    Some(layer.clone())
}

/// Fold layers shorter than `caps.sliver` into a visual neighbour.
///
/// A sliver goes to the previous visual layer of the scene. Talking heads
/// never take one while a visual follows, so it is carried forward to the
/// next visual layer instead. Neighbours that would outgrow the cap where
/// they start are split in two.
pub fn absorb_slivers(drafts: Vec<DraftLayer>, start_secs: f64, caps: &CutCaps) -> Vec<DraftLayer> {
    let mut kept: Vec<DraftLayer> = Vec::with_capacity(drafts.len());
    let mut end = start_secs;
    let mut carry = 0.0;
    let mut first_dropped: Option<DraftLayer> = None;

    for mut draft in drafts {
        if draft.duration_secs < caps.sliver {
            let split = match kept.last_mut() {
                Some(prev) if prev.role != LayerRole::TalkingHead => {
                    let prev_start = end - prev.duration_secs;
                    Some(grow(prev, draft.duration_secs, caps.cap_at(prev_start)))
                }
                _ => None,
            };
            match split {
                Some(extra) => {
                    end += draft.duration_secs;
                    kept.extend(extra);
                }
                None => {
                    carry += draft.duration_secs;
                    let visual = draft.role != LayerRole::TalkingHead;
                    if first_dropped
                        .as_ref()
                        .map_or(true, |d| visual && d.role == LayerRole::TalkingHead)
                    {
                        first_dropped = Some(draft);
                    }
                }
            }
            continue;
        }

        let extra = if carry > 0.0 && draft.role != LayerRole::TalkingHead {
            let extra = grow(&mut draft, carry, caps.cap_at(end));
            carry = 0.0;
            extra
        } else {
            None
        };
        end += draft.duration_secs;
        kept.push(draft);
        if let Some(extra) = extra {
            end += extra.duration_secs;
            kept.push(extra);
        }
    }

    if carry > 0.0 {
        if let Some(at) = kept.iter().rposition(|d| d.role != LayerRole::TalkingHead) {
            let layer_start = start_secs + kept[..at].iter().map(|d| d.duration_secs).sum::<f64>();
            if let Some(extra) = grow(&mut kept[at], carry, caps.cap_at(layer_start)) {
                kept.insert(at + 1, extra);
            }
        } else if let Some(mut spare) = first_dropped
            .filter(|d| kept.is_empty() || (d.role != LayerRole::TalkingHead && carry >= caps.sliver))
        {
            spare.duration_secs = carry;
            kept.push(spare);
        } else if let Some(last) = kept.last_mut() {
            last.duration_secs += carry;
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(secs: f64) -> DraftLayer {
        DraftLayer {
            duration_secs: secs,
            source: LayerSource::Placeholder { label: "x".into() },
            role: LayerRole::Broll,
            line: None,
        }
    }

    #[test]
    fn uniform_caps_split_evenly() {
        let caps = CutCaps::uniform(3.5, 0.25);
        let lengths = caps.lengths(20.0, 15.0);
        assert_eq!(lengths.len(), 5);
        assert!(lengths.iter().all(|l| (l - 3.0).abs() < 1e-9));
    }

    #[test]
    fn early_window_uses_tighter_cap() {
        let caps = CutCaps {
            cap: 3.5,
            early: Some((10.0, 2.0)),
            sliver: 0.25,
        };
        let lengths = caps.lengths(0.0, 15.0);
        let mut at = 0.0;
        for len in &lengths {
            let cap = if at < 10.0 - 1e-9 { 2.0 } else { 3.5 };
            assert!(*len <= cap + 1e-9, "{} at {} over cap {}", len, at, cap);
            at += len;
        }
        assert!((at - 15.0).abs() < 1e-9);
    }

    #[test]
    fn scene_ending_just_past_the_window_stays_under_the_early_cap() {
        let caps = rapid_caps();
        let lengths = caps.lengths(0.0, 10.1);
        assert_eq!(lengths.len(), 6);
        assert!(lengths.iter().all(|l| *l <= 2.0 + 1e-9 && *l >= 0.25));
        assert!((lengths.iter().sum::<f64>() - 10.1).abs() < 1e-9);

        let lengths = caps.lengths(9.9, 2.05);
        let mut at = 9.9;
        for len in &lengths {
            assert!(*len <= caps.cap_at(at) + 1e-9, "{:?}", lengths);
            assert!(*len >= 0.25);
            at += len;
        }
    }

    fn rapid_caps() -> CutCaps {
        CutCaps {
            cap: 3.5,
            early: Some((10.0, 2.0)),
            sliver: 0.25,
        }
    }

    fn head(secs: f64) -> DraftLayer {
        DraftLayer {
            role: LayerRole::TalkingHead,
            line: Some(0),
            ..draft(secs)
        }
    }

    #[test]
    fn slivers_fold_into_neighbours() {
        let caps = CutCaps::uniform(3.5, 0.25);
        let kept = absorb_slivers(vec![draft(0.1), draft(2.0), draft(0.2), draft(1.0)], 0.0, &caps);
        let lengths: Vec<f64> = kept.iter().map(|d| d.duration_secs).collect();
        assert_eq!(lengths.len(), 2);
        assert!((lengths[0] - 2.3).abs() < 1e-9);
        assert!((lengths[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn capped_neighbour_is_split_instead_of_stretched() {
        let kept = absorb_slivers(vec![draft(2.0), draft(0.1)], 8.0, &rapid_caps());
        let lengths: Vec<f64> = kept.iter().map(|d| d.duration_secs).collect();
        assert_eq!(lengths.len(), 2, "{:?}", lengths);
        assert!(lengths.iter().all(|l| (l - 1.05).abs() < 1e-9));
    }

    #[test]
    fn uncapped_segment_still_takes_a_sliver() {
        let kept = absorb_slivers(vec![draft(4.5), draft(0.1)], 0.0, &CutCaps::uniform(3.5, 0.25));
        assert_eq!(kept.len(), 1);
        assert!((kept[0].duration_secs - 4.6).abs() < 1e-9);
    }

    #[test]
    fn sliver_after_a_talking_head_goes_to_the_next_visual() {
        let caps = CutCaps::uniform(3.5, 0.25);
        let kept = absorb_slivers(vec![draft(1.0), head(1.5), draft(0.1), head(1.5), draft(1.0)], 0.0, &caps);
        let lengths: Vec<f64> = kept.iter().map(|d| d.duration_secs).collect();
        assert_eq!(lengths.len(), 4);
        assert!((lengths[1] - 1.5).abs() < 1e-9);
        assert!((lengths[2] - 1.5).abs() < 1e-9);
        assert!((lengths[3] - 1.1).abs() < 1e-9);
    }

    #[test]
    fn trailing_sliver_skips_the_talking_head() {
        let caps = CutCaps::uniform(3.5, 0.25);
        let kept = absorb_slivers(vec![draft(1.0), head(1.5), draft(0.1)], 0.0, &caps);
        let lengths: Vec<f64> = kept.iter().map(|d| d.duration_secs).collect();
        assert!((lengths[0] - 1.1).abs() < 1e-9);
        assert!((lengths[1] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn all_sliver_scene_keeps_one_layer() {
        let kept = absorb_slivers(vec![draft(0.1), draft(0.05)], 0.0, &CutCaps::uniform(3.5, 0.25));
        assert_eq!(kept.len(), 1);
        assert!((kept[0].duration_secs - 0.15).abs() < 1e-9);
    }
}

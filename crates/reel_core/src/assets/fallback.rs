//! Pre-provisioned fallback assets.
//!
//! The fallback folder holds one file per role:
//!
//! ```text
//! narration.wav  voice.wav
//! portrait_<character>.png  portrait.png
//! scene.png
//! broll_<category>.png  broll.png
//! ```
//!
//! The most specific name wins. Audio must be PCM WAV: its duration is read
//! from the RIFF header, and a file that is not falls through to silence.
//! Talking clips have no provisioned fallback; the producer substitutes the
//! speaker's portrait.

use std::path::{Path, PathBuf};

use crate::models::{AssetKind, GenerationParams};

#[derive(Debug, Clone, Default)]
pub struct FallbackLibrary {
    dir: Option<PathBuf>,
}

impl FallbackLibrary {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir: dir.filter(|d| !d.as_os_str().is_empty()),
        }
    }

    /// Library with no provisioned files; every fallback is a placeholder.
    pub fn empty() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Candidate file names for a request, most specific first.
    pub fn candidates(kind: &AssetKind, params: &GenerationParams) -> Vec<String> {
        match kind {
            AssetKind::NarrationAudio => vec!["narration.wav".into()],
            AssetKind::CharacterVoiceAudio { .. } => vec!["voice.wav".into()],
            AssetKind::CharacterPortrait { character_id } => vec![
                format!("portrait_{}.png", character_id),
                "portrait.png".into(),
            ],
            AssetKind::CharacterTalkingClip { .. } => Vec::new(),
            AssetKind::SceneVisual { .. } => vec!["scene.png".into()],
            AssetKind::BrollVisual { .. } => {
                let mut names = Vec::new();
                if let Some(category) = params.category.as_deref().filter(|c| !c.is_empty()) {
                    names.push(format!("broll_{}.png", category));
                }
                names.push("broll.png".into());
                names
            }
        }
    }

    /// First provisioned file that exists for this request.
    pub fn lookup(&self, kind: &AssetKind, params: &GenerationParams) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        Self::candidates(kind, params)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }
}

//! Timeline composition.
//!
//! Turns a plan, its reconciled scene durations and the generated assets
//! into an ordered list of visual layers plus a contiguous soundtrack.
//!
//! # Example
//!
//! ```ignore
//! use reel_core::timeline::TimelineComposer;
//!
//! let composer = TimelineComposer::from_settings(&settings);
//! let timeline = composer.compose(&plan, &reconciliation, &assets)?;
//! assert!((timeline.total_secs() - reconciliation.final_secs).abs() <= 0.3);
//! ```

mod audio;
mod builder;
mod composer;
mod error;
mod patterns;
mod types;

pub use audio::{AudioComposer, SceneSpan};
pub use builder::{CutCaps, DraftLayer, SceneBuilder, TalkingClip};
pub use composer::TimelineComposer;
pub use error::{CompositionError, CompositionResult};
pub use patterns::{get_handler, SceneHandler, SceneTransitions};
pub use types::{
    AudioSegment, AudioSource, CompositeAudio, Layer, LayerRole, LayerSource, Motion, Pan,
    Timeline, Transition,
};

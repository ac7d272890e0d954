//! Data model: the input plan, asset requests and their results.

mod assets;
mod enums;
mod plan;

pub use assets::{
    AssetFile, AssetKind, AssetMap, AssetOutcome, AssetRequest, AssetResult, FallbackSource,
    GenerationParams, RequestId, SceneVariant,
};
pub use enums::{CapabilityClass, EditPattern, MediaKind, PipelineStage};
pub use plan::{
    BrollSlot, Character, CharacterSpokenLine, PlanError, PlanStructure, Scene, SceneId,
    SceneWeight, VideoPlan, VoiceDescriptor,
};

#[cfg(test)]
pub(crate) use plan::fixtures;

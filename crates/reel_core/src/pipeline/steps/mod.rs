//! One file per episode step.
//!
//! Each step handles one phase of turning a plan into a video.

mod assets;
mod compose;
mod plan;
mod publish;
mod render;

pub use assets::AssetsStep;
pub use compose::ComposeStep;
pub use plan::PlanStep;
pub use publish::PublishStep;
pub use render::RenderStep;

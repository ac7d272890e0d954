//! Asset production: request derivation, the per-request producer with its
//! retry and fallback logic, the content-addressed store, and the bounded
//! fan-out that runs them all.

mod fallback;
mod orchestrator;
pub(crate) mod placeholder;
mod producer;
mod request;
mod retry;
mod store;
pub(crate) mod wav;

pub use fallback::FallbackLibrary;
pub use orchestrator::{AssetOrchestrator, ResultSlots, SlotError};
pub use producer::{AssetProducer, TalkingInputs};
pub use request::{seed_for, speaking_time, RequestSet};
pub use retry::{decide, AttemptFailure, AttemptOutcome, RetryPolicy};
pub use store::{hash_file, AssetStore};

#[cfg(test)]
pub(crate) use producer::testing;

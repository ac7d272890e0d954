//! Configuration management for the reel pipeline.
//!
//! Settings live in one TOML file:
//! - one table per concern (`paths`, `quality`, `orchestrator`, ...)
//! - saves go to a sibling temp file that is renamed into place
//! - `update_section` rewrites a single table and keeps user comments elsewhere
//! - missing keys take their defaults
//!
//! # Example
//!
//! ```no_run
//! use reel_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/reel.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Workers: {}", config.settings().orchestrator.workers);
//!
//! config.settings_mut().quality.threshold = 0.7;
//! config.update_section(ConfigSection::Quality).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ComposerSettings, ConfigSection, ExtensionMode, LoggingSettings, OrchestratorSettings,
    PathSettings, ProviderSettings, QualitySettings, RateLimitSettings, RenderSettings, Settings,
    TimingSettings,
};

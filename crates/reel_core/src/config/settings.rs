//! Typed settings, one struct per TOML table.
//!
//! Missing keys fall back to their defaults, so an old settings file
//! keeps loading after new knobs are added.
//! Components receive the section they need at construction time.

use serde::{Deserialize, Serialize};

use crate::models::CapabilityClass;
use crate::quality::{Enhancer, ImageLook, SharpenStrength};

/// Everything the runner reads from `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Where run artifacts land.
    #[serde(default)]
    pub paths: PathSettings,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Asset fan-out settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Quality gate and retry settings.
    #[serde(default)]
    pub quality: QualitySettings,

    /// Per-capability call rates.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,

    /// Duration reconciliation settings.
    #[serde(default)]
    pub timing: TimingSettings,

    /// Timeline composition settings.
    #[serde(default)]
    pub composer: ComposerSettings,

    /// Encoder settings.
    #[serde(default)]
    pub render: RenderSettings,

    /// External provider endpoints.
    #[serde(default)]
    pub providers: ProviderSettings,
}

/// Path configuration. Relative paths resolve against the episode workdir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder (under the workdir) holding content-addressed assets.
    #[serde(default = "default_assets_folder")]
    pub assets_folder: String,

    /// Folder for rendered videos.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Folder for checkpoint records.
    #[serde(default = "default_checkpoint_folder")]
    pub checkpoint_folder: String,

    /// Folder for per-episode log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Folder with pre-provisioned fallback assets. Empty = placeholders only.
    /// Audio files must be PCM WAV; anything else is skipped with a warning.
    #[serde(default)]
    pub fallback_folder: String,
}

fn default_assets_folder() -> String {
    "assets".to_string()
}

fn default_output_folder() -> String {
    "output".to_string()
}

fn default_checkpoint_folder() -> String {
    ".checkpoints".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            assets_folder: default_assets_folder(),
            output_folder: default_output_folder(),
            checkpoint_folder: default_checkpoint_folder(),
            logs_folder: default_logs_folder(),
            fallback_folder: String::new(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// One line per message, no timestamps.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of lines to show in the error tail.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Default filter directive when RUST_LOG is unset.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Also write a daily-rolling log file under the logs folder.
    #[serde(default)]
    pub rolling_file: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            compact: true,
            error_tail: default_error_tail(),
            filter: default_filter(),
            rolling_file: false,
        }
    }
}

/// Asset fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Maximum in-flight producers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Overall ceiling for the whole fan-out, in seconds.
    #[serde(default = "default_join_ceiling")]
    pub join_ceiling_secs: u64,

    /// Per-call timeout for a single collaborator call, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Linear backoff step between attempts, in milliseconds.
    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_workers() -> usize {
    5
}

fn default_join_ceiling() -> u64 {
    600
}

fn default_call_timeout() -> u64 {
    120
}

fn default_backoff() -> u64 {
    500
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            join_ceiling_secs: default_join_ceiling(),
            call_timeout_secs: default_call_timeout(),
            retry_backoff_ms: default_backoff(),
        }
    }
}

/// Quality gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Minimum weighted score to accept a visual.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Suffixes rotated into the prompt after a quality rejection.
    #[serde(default = "default_suffixes")]
    pub prompt_suffixes: Vec<String>,

    /// Contrast, sharpen and grade accepted visuals and provisioned stills.
    #[serde(default = "default_post_process")]
    pub post_process: bool,

    #[serde(default)]
    pub sharpen: SharpenStrength,

    #[serde(default)]
    pub look: ImageLook,
}

fn default_threshold() -> f64 {
    0.65
}

fn default_max_attempts() -> u32 {
    3
}

fn default_post_process() -> bool {
    true
}

fn default_suffixes() -> Vec<String> {
    vec![
        "sharp focus, high detail".to_string(),
        "balanced lighting, natural exposure".to_string(),
        "clear subject, shallow depth of field".to_string(),
    ]
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_attempts: default_max_attempts(),
            prompt_suffixes: default_suffixes(),
            post_process: default_post_process(),
            sharpen: SharpenStrength::default(),
            look: ImageLook::default(),
        }
    }
}

impl QualitySettings {
    /// The post-processor, when enabled.
    pub fn enhancer(&self) -> Option<Enhancer> {
        self.post_process.then(|| Enhancer::new(self.sharpen, self.look))
    }
}

/// Calls per minute for each capability class. Zero = unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_speech_rate")]
    pub speech_per_minute: u32,

    #[serde(default = "default_image_rate")]
    pub image_per_minute: u32,

    #[serde(default = "default_talking_rate")]
    pub talking_clip_per_minute: u32,

    /// Replenish period in seconds (60 for per-minute rates).
    #[serde(default = "default_period")]
    pub period_secs: u64,
}

fn default_speech_rate() -> u32 {
    20
}

fn default_image_rate() -> u32 {
    30
}

fn default_talking_rate() -> u32 {
    6
}

fn default_period() -> u64 {
    60
}

impl RateLimitSettings {
    /// Configured rate for a class.
    pub fn rate_for(&self, class: CapabilityClass) -> u32 {
        match class {
            CapabilityClass::Speech => self.speech_per_minute,
            CapabilityClass::Image => self.image_per_minute,
            CapabilityClass::TalkingClip => self.talking_clip_per_minute,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            speech_per_minute: default_speech_rate(),
            image_per_minute: default_image_rate(),
            talking_clip_per_minute: default_talking_rate(),
            period_secs: default_period(),
        }
    }
}

/// How short narration is extended to the target runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionMode {
    /// Repeat the tail of the narration.
    #[default]
    LoopTail,
    /// Pad with silence.
    PadSilence,
}

/// Duration reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Accept narration within this ratio of the target (0.10 = ±10%).
    #[serde(default = "default_tolerance_ratio")]
    pub tolerance_ratio: f64,

    /// Minimum duration of any scene, in seconds.
    #[serde(default = "default_min_scene")]
    pub min_scene_secs: f64,

    #[serde(default)]
    pub extension: ExtensionMode,

    /// Length of narration tail repeated when looping, in seconds.
    #[serde(default = "default_loop_tail")]
    pub loop_tail_secs: f64,

    /// Allowed drift between layer total and final duration, in seconds.
    #[serde(default = "default_composition_tolerance")]
    pub composition_tolerance_secs: f64,
}

fn default_tolerance_ratio() -> f64 {
    0.10
}

fn default_min_scene() -> f64 {
    1.5
}

fn default_loop_tail() -> f64 {
    4.0
}

fn default_composition_tolerance() -> f64 {
    0.3
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tolerance_ratio: default_tolerance_ratio(),
            min_scene_secs: default_min_scene(),
            extension: ExtensionMode::default(),
            loop_tail_secs: default_loop_tail(),
            composition_tolerance_secs: default_composition_tolerance(),
        }
    }
}

/// Timeline composition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerSettings {
    /// Maximum length of a narration-only sub-cut, in seconds.
    #[serde(default = "default_still_cap")]
    pub still_cap_secs: f64,

    /// MixedRapid cap for layers starting early in the video.
    #[serde(default = "default_rapid_early_cap")]
    pub rapid_early_cap_secs: f64,

    /// End of the "early" window for MixedRapid, in seconds.
    #[serde(default = "default_rapid_early_window")]
    pub rapid_early_window_secs: f64,

    /// Share of scene time given to talking heads in TalkingHeadHeavy.
    #[serde(default = "default_th_share")]
    pub talking_head_share: f64,

    /// BrollCinematic talking-head cap, in seconds.
    #[serde(default = "default_cinematic_th_cap")]
    pub cinematic_talking_cap_secs: f64,

    /// BrollCinematic talking-head cap as a share of the scene.
    #[serde(default = "default_cinematic_th_share")]
    pub cinematic_talking_share: f64,

    /// Preferred BrollCinematic segment length, in seconds.
    #[serde(default = "default_cinematic_segment")]
    pub cinematic_segment_secs: f64,

    /// Maximum BrollCinematic segment length, in seconds.
    #[serde(default = "default_cinematic_segment_max")]
    pub cinematic_segment_max_secs: f64,

    /// Scale change applied over an image layer (0.10 = 10%).
    #[serde(default = "default_zoom")]
    pub zoom_amount: f64,

    /// Layers shorter than this are absorbed into their neighbour.
    #[serde(default = "default_sliver")]
    pub sliver_secs: f64,
}

fn default_still_cap() -> f64 {
    3.5
}

fn default_rapid_early_cap() -> f64 {
    2.0
}

fn default_rapid_early_window() -> f64 {
    10.0
}

fn default_th_share() -> f64 {
    0.65
}

fn default_cinematic_th_cap() -> f64 {
    3.0
}

fn default_cinematic_th_share() -> f64 {
    0.2
}

fn default_cinematic_segment() -> f64 {
    4.5
}

fn default_cinematic_segment_max() -> f64 {
    5.0
}

fn default_zoom() -> f64 {
    0.10
}

fn default_sliver() -> f64 {
    0.25
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            still_cap_secs: default_still_cap(),
            rapid_early_cap_secs: default_rapid_early_cap(),
            rapid_early_window_secs: default_rapid_early_window(),
            talking_head_share: default_th_share(),
            cinematic_talking_cap_secs: default_cinematic_th_cap(),
            cinematic_talking_share: default_cinematic_th_share(),
            cinematic_segment_secs: default_cinematic_segment(),
            cinematic_segment_max_secs: default_cinematic_segment_max(),
            zoom_amount: default_zoom(),
            sliver_secs: default_sliver(),
        }
    }
}

/// Encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// ffmpeg executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// x264 preset.
    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_crf")]
    pub crf: u32,

    /// Longest an encode may run before ffmpeg is killed.
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_fps() -> u32 {
    30
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_crf() -> u32 {
    20
}

fn default_render_timeout() -> u64 {
    1800
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            fps: default_fps(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            preset: default_preset(),
            crf: default_crf(),
            timeout_secs: default_render_timeout(),
        }
    }
}

/// External provider configuration. Empty endpoints mean "not configured".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Hugging Face inference endpoint for image synthesis.
    #[serde(default)]
    pub image_endpoint: String,

    /// Bearer token for the image endpoint.
    #[serde(default)]
    pub image_token: String,

    /// ElevenLabs API base URL.
    #[serde(default = "default_speech_base")]
    pub speech_base_url: String,

    #[serde(default)]
    pub speech_api_key: String,

    /// Narrator voice used when the plan gives none.
    #[serde(default)]
    pub default_voice_id: String,

    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    /// HTTP request timeout, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_speech_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_speech_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_http_timeout() -> u64 {
    90
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            image_endpoint: String::new(),
            image_token: String::new(),
            speech_base_url: default_speech_base(),
            speech_api_key: String::new(),
            default_voice_id: String::new(),
            speech_model: default_speech_model(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// Table names accepted by `ConfigManager::update_section`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Orchestrator,
    Quality,
    RateLimits,
    Timing,
    Composer,
    Render,
    Providers,
}

impl ConfigSection {
    /// Key of the table in the TOML document.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Orchestrator => "orchestrator",
            ConfigSection::Quality => "quality",
            ConfigSection::RateLimits => "rate_limits",
            ConfigSection::Timing => "timing",
            ConfigSection::Composer => "composer",
            ConfigSection::Render => "render",
            ConfigSection::Providers => "providers",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[rate_limits]"));
        assert!(toml.contains("still_cap_secs"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[quality]\nthreshold = 0.7";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.quality.threshold, 0.7);
        assert_eq!(parsed.quality.max_attempts, 3);
        assert_eq!(parsed.orchestrator.workers, 5);
        assert_eq!(parsed.timing.extension, ExtensionMode::LoopTail);
    }

    #[test]
    fn post_processing_reads_lowercase_names() {
        let parsed: Settings = toml::from_str("[quality]\nsharpen = \"high\"\nlook = \"warm\"").unwrap();
        assert_eq!(
            parsed.quality.enhancer(),
            Some(Enhancer::new(SharpenStrength::High, ImageLook::Warm))
        );

        let off: Settings = toml::from_str("[quality]\npost_process = false").unwrap();
        assert_eq!(off.quality.enhancer(), None);
    }

    #[test]
    fn rate_lookup_by_class() {
        let limits = RateLimitSettings {
            talking_clip_per_minute: 0,
            ..Default::default()
        };
        assert_eq!(limits.rate_for(CapabilityClass::Image), 30);
        assert_eq!(limits.rate_for(CapabilityClass::TalkingClip), 0);
    }
}

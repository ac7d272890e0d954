//! Levels, prefixes and settings for episode logs.

use serde::{Deserialize, Serialize};

use crate::config::LoggingSettings;

/// Severity of an episode log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration for an episode logger.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Lines below this level are dropped.
    pub level: LogLevel,
    /// Compact mode keeps external tool output in the tail only.
    pub compact: bool,
    /// Number of lines kept for the failure tail.
    pub error_tail: usize,
    pub show_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            error_tail: 20,
            show_timestamps: true,
        }
    }
}

impl LogConfig {
    /// Verbose configuration, no compaction.
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
            compact: false,
            error_tail: 50,
            show_timestamps: true,
        }
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            compact: settings.compact,
            error_tail: settings.error_tail as usize,
            ..Self::default()
        }
    }
}

/// Callback receiving every formatted log line (e.g. a progress UI).
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Marker prepended to a log line by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePrefix {
    /// External command line, shown as `$ ffmpeg ...`.
    Command,
    /// Stage banner, shown as `=== Render ===`.
    Phase,
    /// Asset outcome: `[asset]`
    Asset,
    Success,
    Warning,
    Error,
    None,
}

impl MessagePrefix {
    pub fn format(&self, message: &str) -> String {
        match self {
            MessagePrefix::Command => format!("$ {}", message),
            MessagePrefix::Phase => format!("=== {} ===", message),
            MessagePrefix::Asset => format!("[asset] {}", message),
            MessagePrefix::Success => format!("[SUCCESS] {}", message),
            MessagePrefix::Warning => format!("[WARNING] {}", message),
            MessagePrefix::Error => format!("[ERROR] {}", message),
            MessagePrefix::None => message.to_string(),
        }
    }
}

//! Per-episode logger with file and callback output.
//!
//! Each episode run gets its own logger that:
//! - Writes to a dedicated log file under the logs folder
//! - Forwards lines to an optional callback
//! - Keeps a tail of external tool output for failure diagnosis

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};
use crate::models::{AssetOutcome, AssetResult};

/// Per-episode logger with dual output (file + callback).
pub struct EpisodeLogger {
    episode_id: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Mutex<Option<LogCallback>>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl EpisodeLogger {
    /// Create a logger writing `<log_dir>/<episode_id>.log`.
    pub fn new(
        episode_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let episode_id = episode_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&episode_id)));
        // Append so a resumed run keeps the history of the interrupted one
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            episode_id,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback: Mutex::new(callback),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
        })
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        self.output(&self.format_message(message));
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Record the terminal outcome of one asset request.
    ///
    /// Degraded outcomes go out at warn level with their reason.
    pub fn asset(&self, result: &AssetResult) {
        let score = result
            .quality_score
            .map(|s| format!(" score={:.2}", s))
            .unwrap_or_default();
        let base = format!(
            "{} {} attempts={} {}ms{}{}",
            result.request_id,
            result.outcome.label(),
            result.attempts,
            result.elapsed_ms,
            score,
            if result.reused { " (reused)" } else { "" },
        );

        match &result.outcome {
            AssetOutcome::Resolved { .. } => {
                self.log(LogLevel::Info, &MessagePrefix::Asset.format(&base));
            }
            AssetOutcome::Fallback { source, reason, .. } => {
                let msg = format!("{} source={:?} reason={}", base, source, reason);
                self.log(LogLevel::Warn, &MessagePrefix::Asset.format(&msg));
            }
            AssetOutcome::Failed { reason, .. } => {
                let msg = format!("{} reason={}", base, reason);
                self.log(LogLevel::Error, &MessagePrefix::Asset.format(&msg));
            }
        }
    }

    /// Record a line of external tool output.
    ///
    /// In compact mode, lines only go to the tail buffer.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        {
            let mut buffer = self.tail_buffer.lock();
            if buffer.len() >= self.config.error_tail.max(1) {
                buffer.pop_front();
            }
            buffer.push_back(line.to_string());
        }

        if self.config.compact {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        self.output(&self.format_message(&format!("{}{}", prefix, line)));
    }

    /// Dump the tail buffer (typically after an error).
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in buffer.iter() {
            self.output(&self.format_message(line));
        }
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl Drop for EpisodeLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replace characters that are unsafe in file names.
pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

//! Reads and writes the settings file, one TOML section at a time.
//!
//! - Atomic writes (temp file, then rename)
//! - Section-level updates through toml_edit, leaving other sections untouched
//! - Missing keys filled from defaults and written back on `load_or_create`

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Failure while reading, parsing, or writing the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

const SECTIONS: [(ConfigSection, &str); 9] = [
    (ConfigSection::Paths, "Working directories (relative to the episode workdir)"),
    (ConfigSection::Logging, "Logging configuration"),
    (ConfigSection::Orchestrator, "Asset fan-out"),
    (ConfigSection::Quality, "Quality gate and retries"),
    (ConfigSection::RateLimits, "Calls per period for each capability (0 = unlimited)"),
    (ConfigSection::Timing, "Duration reconciliation"),
    (ConfigSection::Composer, "Timeline composition"),
    (ConfigSection::Render, "Encoder"),
    (ConfigSection::Providers, "External providers (empty endpoint = not configured)"),
];

/// Manages pipeline configuration.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Manager bound to `config_path`.
    ///
    /// Nothing is read until `load()` or `load_or_create()`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Consume the manager, handing out the immutable settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load config from file. Returns error if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let settings: Settings = toml::from_str(&content)?;
        validate(&settings)?;
        self.settings = settings;
        Ok(())
    }

    /// Load config from file, creating it with defaults if it doesn't exist.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = parse_and_check(&content)?;
            validate(&settings)?;
            self.settings = settings;

            if was_modified {
                tracing::debug!(path = %self.config_path.display(), "filling missing config keys");
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Write every section through a temp file and rename.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update one section on disk, leaving the others as they are.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        let content = match section {
            ConfigSection::Paths => toml::to_string_pretty(&s.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&s.logging)?,
            ConfigSection::Orchestrator => toml::to_string_pretty(&s.orchestrator)?,
            ConfigSection::Quality => toml::to_string_pretty(&s.quality)?,
            ConfigSection::RateLimits => toml::to_string_pretty(&s.rate_limits)?,
            ConfigSection::Timing => toml::to_string_pretty(&s.timing)?,
            ConfigSection::Composer => toml::to_string_pretty(&s.composer)?,
            ConfigSection::Render => toml::to_string_pretty(&s.render)?,
            ConfigSection::Providers => toml::to_string_pretty(&s.providers)?,
        };
        Ok(content)
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# Reel pipeline configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n",
        );

        for (section, comment) in SECTIONS {
            output.push('\n');
            output.push_str(&format!("# {}\n[{}]\n", comment, section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

/// Parse settings and report whether the file lacks keys or has unknown sections.
fn parse_and_check(content: &str) -> ConfigResult<(Settings, bool)> {
    let doc: DocumentMut = content.parse()?;
    let settings: Settings = toml::from_str(content)?;

    let has_unknown = doc
        .iter()
        .any(|(key, _)| !SECTIONS.iter().any(|(s, _)| s.table_name() == key));

    let mut missing = false;
    let defaults: DocumentMut = toml::to_string(&settings)?.parse()?;
    for (name, item) in defaults.iter() {
        let Some(expected) = item.as_table() else {
            continue;
        };
        match doc.get(name).and_then(Item::as_table) {
            Some(present) => {
                if expected.iter().any(|(key, _)| !present.contains_key(key)) {
                    missing = true;
                }
            }
            None => missing = true,
        }
    }

    Ok((settings, has_unknown || missing))
}

/// Reject values no component can work with.
fn validate(settings: &Settings) -> ConfigResult<()> {
    if settings.orchestrator.workers == 0 {
        return Err(ConfigError::InvalidValue {
            key: "orchestrator.workers",
            reason: "must be at least 1".to_string(),
        });
    }
    if settings.quality.max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            key: "quality.max_attempts",
            reason: "must be at least 1".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&settings.quality.threshold) {
        return Err(ConfigError::InvalidValue {
            key: "quality.threshold",
            reason: format!("{} is outside [0, 1]", settings.quality.threshold),
        });
    }
    if settings.composer.still_cap_secs <= 0.0 || settings.composer.rapid_early_cap_secs <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key: "composer",
            reason: "sub-cut caps must be positive".to_string(),
        });
    }
    if settings.render.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "render.timeout_secs",
            reason: "must be at least 1".to_string(),
        });
    }
    if settings.rate_limits.period_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "rate_limits.period_secs",
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

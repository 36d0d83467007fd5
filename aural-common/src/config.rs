//! Bootstrap configuration and root folder resolution
//!
//! Configuration is read once at startup from a TOML file. A missing file is
//! not fatal: the server logs a warning and runs on built-in defaults.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML `root_folder`
//! 4. OS-dependent default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "AURAL_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database, clip bytes and checkpoints
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    /// Configured vocabularies; immutable for the lifetime of the process
    #[serde(default = "default_vocabularies")]
    pub vocabularies: Vec<VocabularyConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Online training parameters shared by every vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Examples per training step
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bound of each session's command queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Features per stride produced by the feature extractor
    #[serde(default = "default_feature_width")]
    pub feature_width: usize,

    /// Pause after each training step (runtime adjustable)
    #[serde(default)]
    pub step_delay_ms: u64,

    /// Periodic checkpoint interval; 0 disables autosave
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,

    /// SGD learning rate for the reference trainer
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Max time to retry a write while SQLite reports "database is locked"
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

/// One vocabulary: a closed set of label states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub name: String,
    /// State names; a label's state index points into this list
    pub states: Vec<String>,
    /// Overrides the system-wide stride count when set
    #[serde(default)]
    pub strides_per_clip: Option<usize>,
}

impl VocabularyConfig {
    pub fn new(name: &str, states: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            states: states.iter().map(|s| s.to_string()).collect(),
            strides_per_clip: None,
        }
    }
}

fn default_port() -> u16 {
    48125
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    64
}

fn default_feature_width() -> usize {
    13
}

fn default_autosave_interval_secs() -> u64 {
    600
}

fn default_learning_rate() -> f32 {
    0.05
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

/// The four vocabularies the label server ships with
pub fn default_vocabularies() -> Vec<VocabularyConfig> {
    vec![
        VocabularyConfig::new(
            "word",
            &["nil", "sil", "yes", "no", "stop", "go", "play", "pause", "next", "back"],
        ),
        VocabularyConfig::new(
            "intent",
            &["nil", "play", "pause", "next", "previous", "volume_up", "volume_down", "what_time"],
        ),
        VocabularyConfig::new("speaker", &["nil", "unknown", "primary", "secondary", "other"]),
        VocabularyConfig::new(
            "emotion",
            &["nil", "neutral", "happy", "sad", "angry", "surprised"],
        ),
    ]
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            feature_width: default_feature_width(),
            step_delay_ms: 0,
            autosave_interval_secs: default_autosave_interval_secs(),
            learning_rate: default_learning_rate(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            training: TrainingConfig::default(),
            vocabularies: default_vocabularies(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the server cannot run with
    ///
    /// Vocabulary names double as file names for checkpoints, so they are
    /// restricted to `[a-z0-9_-]`.
    pub fn validate(&self) -> Result<()> {
        if self.training.batch_size == 0 {
            return Err(Error::Config("training.batch_size must be > 0".to_string()));
        }
        if self.training.queue_capacity == 0 {
            return Err(Error::Config("training.queue_capacity must be > 0".to_string()));
        }
        if self.training.feature_width == 0 {
            return Err(Error::Config("training.feature_width must be > 0".to_string()));
        }
        if self.vocabularies.is_empty() {
            return Err(Error::Config("at least one vocabulary is required".to_string()));
        }

        let mut seen = HashSet::new();
        for vocab in &self.vocabularies {
            if !is_valid_vocab_name(&vocab.name) {
                return Err(Error::Config(format!(
                    "invalid vocabulary name '{}' (allowed: a-z, 0-9, '_', '-')",
                    vocab.name
                )));
            }
            if !seen.insert(vocab.name.as_str()) {
                return Err(Error::Config(format!("duplicate vocabulary '{}'", vocab.name)));
            }
            if vocab.states.is_empty() {
                return Err(Error::Config(format!("vocabulary '{}' has no states", vocab.name)));
            }
            if vocab.strides_per_clip == Some(0) {
                return Err(Error::Config(format!(
                    "vocabulary '{}' has strides_per_clip = 0",
                    vocab.name
                )));
            }
        }
        Ok(())
    }
}

/// Vocabulary names are non-empty and filesystem safe
pub fn is_valid_vocab_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Load the TOML config at `path`
///
/// A missing file yields defaults with a warning; a present but unreadable or
/// invalid file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Default config file location: `<config dir>/aural/aural-ls.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("aural").join("aural-ls.toml"))
        .unwrap_or_else(|| PathBuf::from("aural-ls.toml"))
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("aural"))
        .unwrap_or_else(|| PathBuf::from("./aural_data"))
}

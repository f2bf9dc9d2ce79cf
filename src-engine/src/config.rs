//! Engine configuration.
//!
//! Stored as JSON in the platform config directory:
//! - Linux: `~/.config/subforge/config.json`
//! - macOS: `~/Library/Application Support/subforge/config.json`
//! - Windows: `%APPDATA%\subforge\config.json`

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use subforge_common::paths;
use tracing::{debug, info, warn};

/// Loudness below which audio counts as silence.
pub const DEFAULT_SILENCE_NOISE_DB: f64 = -30.0;

/// Shortest pause treated as a silence.
pub const DEFAULT_SILENCE_MIN_DURATION_SECS: f64 = 0.5;

/// Upper bound on recognizer threads.
pub const DEFAULT_MAX_THREADS: usize = 8;

fn default_language() -> String {
    "auto".to_string()
}

fn default_max_threads() -> usize {
    DEFAULT_MAX_THREADS
}

fn default_silence_noise_db() -> f64 {
    DEFAULT_SILENCE_NOISE_DB
}

fn default_silence_min_duration_secs() -> f64 {
    DEFAULT_SILENCE_MIN_DURATION_SECS
}

/// Settings for the transcription engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// FFmpeg binary. If None, PATH and the sidecar location are searched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
    /// whisper-cli binary. If None, the downloaded release and PATH are searched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_path: Option<PathBuf>,
    /// Root for downloaded models and binaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Where finished subtitle files go by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Recognizer language code, or "auto".
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_silence_noise_db")]
    pub silence_noise_db: f64,
    #[serde(default = "default_silence_min_duration_secs")]
    pub silence_min_duration_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            whisper_path: None,
            data_dir: None,
            output_dir: None,
            language: default_language(),
            max_threads: DEFAULT_MAX_THREADS,
            silence_noise_db: DEFAULT_SILENCE_NOISE_DB,
            silence_min_duration_secs: DEFAULT_SILENCE_MIN_DURATION_SECS,
        }
    }
}

impl EngineConfig {
    /// Effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(paths::default_data_dir)
    }

    /// Effective output directory.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => paths::default_output_dir(),
        }
    }

    /// A fresh `transcript_<timestamp>.srt` path in the output directory.
    pub fn default_output_path(&self) -> PathBuf {
        self.output_dir().join(transcript_file_name())
    }
}

/// File name for a transcript written now.
pub fn transcript_file_name() -> String {
    format!("transcript_{}.srt", Local::now().format("%Y-%m-%d_%H%M%S"))
}

/// Load configuration from the default location.
/// Returns defaults if the file doesn't exist or is invalid.
pub fn load_config() -> EngineConfig {
    match paths::config_path() {
        Some(path) => load_config_from(&path),
        None => {
            warn!("Could not determine config directory, using defaults");
            EngineConfig::default()
        }
    }
}

/// Load configuration from a specific file.
pub fn load_config_from(path: &Path) -> EngineConfig {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return EngineConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<EngineConfig>(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                EngineConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}. Using defaults.", e);
            EngineConfig::default()
        }
    }
}

/// Save configuration to the default location.
pub fn save_config(config: &EngineConfig) -> Result<PathBuf, String> {
    let path = paths::config_path().ok_or("Could not determine config directory")?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save configuration to a specific file, creating its directory.
pub fn save_config_to(config: &EngineConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;

    info!("Saved config to {}", path.display());
    Ok(())
}

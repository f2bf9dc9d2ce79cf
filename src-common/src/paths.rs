//! Platform directories for configuration, downloaded assets and output.
//!
//! - Linux: `~/.config/subforge`, `~/.local/share/subforge`
//! - macOS: `~/Library/Application Support/subforge`
//! - Windows: `%APPDATA%\subforge`

use directories::{ProjectDirs, UserDirs};
use std::path::PathBuf;

/// Project directories for subforge, if a home directory can be determined.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "subforge")
}

/// Path to the JSON configuration file.
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
}

/// Root directory for downloaded recognizer binaries and models.
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("subforge"))
}

/// Directory holding ggml model files.
pub fn models_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("whisper").join("models")
}

/// Directory holding the extracted recognizer release.
pub fn bin_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("whisper").join("bin")
}

/// Default directory for finished subtitle files (the Videos folder, else home).
pub fn default_output_dir() -> PathBuf {
    let Some(user_dirs) = UserDirs::new() else {
        return std::env::temp_dir();
    };

    user_dirs
        .video_dir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| {
            let videos = user_dirs.home_dir().join("Videos");
            if videos.exists() {
                videos
            } else {
                user_dirs.home_dir().to_path_buf()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_asset_dirs_are_under_data_dir() {
        let data = Path::new("/data/subforge");
        assert_eq!(models_dir(data), PathBuf::from("/data/subforge/whisper/models"));
        assert_eq!(bin_dir(data), PathBuf::from("/data/subforge/whisper/bin"));
    }

    #[test]
    fn test_config_path_file_name() {
        if let Some(path) = config_path() {
            assert_eq!(path.file_name().unwrap(), "config.json");
        }
    }
}

//! Platform-specific logging directory resolution.

use std::path::PathBuf;

use crate::paths::project_dirs;

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/subforge/logs` or `~/.local/state/subforge/logs` |
/// | macOS | `~/Library/Logs/subforge` |
/// | Windows | `%LOCALAPPDATA%\subforge\logs` |
///
/// Falls back to `<tmp>/subforge/logs` when no home directory can be determined.
pub fn log_dir() -> PathBuf {
    let Some(base) = project_dirs() else {
        return std::env::temp_dir().join("subforge").join("logs");
    };

    #[cfg(target_os = "linux")]
    {
        base.state_dir()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().join("state"))
            .join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/subforge; logs belong
        // in ~/Library/Logs/subforge.
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        library.join("Logs").join("subforge")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        base.data_local_dir().join("logs")
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// File name prefix for the CLI's rolling log.
///
/// The rolling appender creates dated files such as `subforge-cli.2026-03-01.log`.
pub const CLI_LOG_PREFIX: &str = "subforge-cli";

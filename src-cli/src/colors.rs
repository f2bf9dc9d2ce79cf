//! Terminal color support for CLI output.
//!
//! Provides colorful output when running interactively, with automatic
//! detection to disable colors when output is piped or redirected.

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use subforge_common::TranscriptionPhase;

/// Pad a string to a minimum width (left-aligned), then apply a color function.
/// This correctly handles ANSI escape codes by padding before colorizing.
pub fn pad_left<F>(msg: &str, width: usize, color_fn: F) -> String
where
    F: FnOnce(&str) -> String,
{
    let padded = format!("{:<width$}", msg);
    color_fn(&padded)
}

/// Check if stdout is a terminal (interactive mode).
pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal()
}

/// Check if stderr is a terminal (interactive mode).
pub fn is_stderr_interactive() -> bool {
    std::io::stderr().is_terminal()
}

/// Style for error messages.
pub fn error(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{} {}", "error:".red().bold(), msg)
    } else {
        format!("error: {}", msg)
    }
}

/// Style for warning messages.
pub fn warning(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{} {}", "warning:".yellow().bold(), msg)
    } else {
        format!("warning: {}", msg)
    }
}

/// Style for success messages.
pub fn success(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.green())
    } else {
        msg.to_string()
    }
}

/// Style for dim/secondary text.
pub fn dim(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.dimmed())
    } else {
        msg.to_string()
    }
}

/// Style for bold text.
pub fn bold(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.bold())
    } else {
        msg.to_string()
    }
}

/// Style for header text (bold + color).
pub fn header(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.bold().blue())
    } else {
        msg.to_string()
    }
}

/// Style for file paths.
pub fn path(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.underline())
    } else {
        msg.to_string()
    }
}

/// Style for identifiers such as model ids.
pub fn number(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.cyan())
    } else {
        msg.to_string()
    }
}

/// Style for "yes" indicator.
pub fn yes() -> String {
    if is_interactive() {
        format!("{}", "yes".green())
    } else {
        "yes".to_string()
    }
}

/// Style for "no" indicator.
pub fn no() -> String {
    if is_interactive() {
        format!("{}", "no".dimmed())
    } else {
        "no".to_string()
    }
}

/// Transcript timestamp prefix, on stdout.
pub fn timestamp(stamp: &str) -> String {
    let text = format!("[{}]", stamp);
    if is_interactive() {
        format!("{}", text.yellow())
    } else {
        text
    }
}

/// Human label for a phase, on stderr.
pub fn phase(phase: TranscriptionPhase) -> String {
    let label = match phase {
        TranscriptionPhase::Idle => "Idle",
        TranscriptionPhase::DownloadingBinary => "Downloading whisper.cpp",
        TranscriptionPhase::DownloadingModel => "Downloading model",
        TranscriptionPhase::Preparing => "Preparing audio",
        TranscriptionPhase::Segmenting => "Detecting silences",
        TranscriptionPhase::Transcribing => "Transcribing",
        TranscriptionPhase::Done => "Done",
        TranscriptionPhase::Error => "Failed",
        TranscriptionPhase::Cancelled => "Cancelled",
    };

    if !is_stderr_interactive() {
        return label.to_string();
    }

    match phase {
        TranscriptionPhase::DownloadingBinary | TranscriptionPhase::DownloadingModel => {
            format!("{}", label.yellow())
        }
        TranscriptionPhase::Transcribing => format!("{}", label.cyan().bold()),
        TranscriptionPhase::Done => format!("{}", label.green()),
        TranscriptionPhase::Error => format!("{}", label.red().bold()),
        _ => format!("{}", label.cyan()),
    }
}

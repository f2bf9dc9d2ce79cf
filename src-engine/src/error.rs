//! Error types for the transcription engine.

use std::io;
use std::path::PathBuf;

use subforge_common::validation::ValidationError;
use thiserror::Error;

/// Failures running an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed while waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Process was cancelled")]
    Cancelled,
}

/// Failures obtaining the recognizer binary or a model file.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed with HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to extract recognizer archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Downloaded file {path} is incomplete ({actual} of {expected} bytes)")]
    Incomplete {
        path: PathBuf,
        actual: u64,
        expected: u64,
    },

    #[error("FFmpeg is not available: {0}")]
    FfmpegUnavailable(String),

    #[error("whisper-cli was not found in the downloaded archive")]
    BinaryMissingFromArchive,

    #[error(
        "No prebuilt whisper.cpp binary is available for this platform. \
         Install whisper.cpp and make sure `whisper-cli` is on PATH, \
         or set `whisper_path` in the configuration file."
    )]
    UnsupportedPlatform,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Download was cancelled")]
    Cancelled,
}

/// Failure of a transcription run.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Engine acquisition failed: {0}")]
    Acquisition(#[from] AssetError),

    #[error("Audio preparation failed: {message}{}", format_tail(.tail))]
    Normalization { message: String, tail: String },

    #[error("Silence detection failed: {message}{}", format_tail(.tail))]
    Analysis { message: String, tail: String },

    #[error("Recognition failed on segment {segment}: {message}{}", format_tail(.tail))]
    Recognition {
        segment: usize,
        message: String,
        tail: String,
    },

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transcription was cancelled")]
    Cancelled,
}

fn format_tail(tail: &str) -> String {
    if tail.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", tail.trim_end())
    }
}

impl TranscriptionError {
    /// Cancelled runs end silently rather than reporting an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TranscriptionError::Cancelled | TranscriptionError::Acquisition(AssetError::Cancelled)
        )
    }
}

impl From<TranscriptionError> for String {
    fn from(err: TranscriptionError) -> Self {
        err.to_string()
    }
}

impl From<AssetError> for String {
    fn from(err: AssetError) -> Self {
        err.to_string()
    }
}

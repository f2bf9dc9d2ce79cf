//! Shared types for transcription progress reporting and the model catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Phase of a transcription run.
///
/// Phases are reported in declaration order; `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptionPhase {
    /// No run in progress
    #[default]
    Idle,
    /// Fetching the recognizer binary
    DownloadingBinary,
    /// Fetching the recognizer model
    DownloadingModel,
    /// Concatenating and normalizing the input audio
    Preparing,
    /// Detecting silences and building segments
    Segmenting,
    /// Running the recognizer segment by segment
    Transcribing,
    /// Subtitle document written
    Done,
    /// Run aborted by a failure
    Error,
    /// Run aborted by the caller. Never emitted by the orchestrator itself.
    Cancelled,
}

impl TranscriptionPhase {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DownloadingBinary => "downloading-binary",
            Self::DownloadingModel => "downloading-model",
            Self::Preparing => "preparing",
            Self::Segmenting => "segmenting",
            Self::Transcribing => "transcribing",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this phase ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for TranscriptionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress update for a transcription run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Current phase
    pub phase: TranscriptionPhase,
    /// Completion within the phase, 0..=100
    pub percent: u8,
    /// Human-readable status line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds of audio processed so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_sec: Option<f64>,
    /// Total audio duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_sec: Option<f64>,
    /// Newly recognized text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_text: Option<String>,
    /// Run-global start time of `segment_text` as `HH:MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_timestamp: Option<String>,
    /// Written subtitle file (`done` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Failure description (`error` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProgressEvent {
    /// Create an event for the given phase and percent.
    pub fn new(phase: TranscriptionPhase, percent: u8) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            ..Default::default()
        }
    }

    /// Attach a status message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach elapsed and total audio seconds.
    pub fn with_timing(mut self, elapsed_sec: Option<f64>, total_duration_sec: f64) -> Self {
        self.elapsed_sec = elapsed_sec;
        self.total_duration_sec = Some(total_duration_sec);
        self
    }

    /// Attach a newly recognized line of text.
    pub fn with_segment(mut self, text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        self.segment_text = Some(text.into());
        self.segment_timestamp = Some(timestamp.into());
        self
    }

    /// Terminal success event.
    pub fn done(output_path: PathBuf) -> Self {
        Self {
            output_path: Some(output_path),
            ..Self::new(TranscriptionPhase::Done, 100).with_message("Transcription complete!")
        }
    }

    /// Terminal failure event.
    pub fn error(error_message: impl Into<String>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            ..Self::new(TranscriptionPhase::Error, 0)
        }
    }
}

/// Whisper model sizes offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    Base,
    #[default]
    Small,
    Medium,
}

impl WhisperModel {
    /// All models, smallest first.
    pub const ALL: [WhisperModel; 4] = [Self::Tiny, Self::Base, Self::Small, Self::Medium];

    /// Model identifier as used in file names and URLs.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
        }
    }

    /// Catalog entry for this model.
    pub fn info(&self) -> &'static WhisperModelInfo {
        match self {
            Self::Tiny => &WHISPER_MODELS[0],
            Self::Base => &WHISPER_MODELS[1],
            Self::Small => &WHISPER_MODELS[2],
            Self::Medium => &WHISPER_MODELS[3],
        }
    }

    /// File name of the ggml model, e.g. `ggml-small.bin`.
    pub fn file_name(&self) -> String {
        format!("ggml-{}.bin", self.id())
    }

    /// Download URL on Hugging Face.
    pub fn download_url(&self) -> String {
        format!("{}/{}", MODEL_BASE_URL, self.file_name())
    }
}

impl fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for WhisperModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(Self::Tiny),
            "base" => Ok(Self::Base),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            other => Err(format!(
                "Unknown model '{}' (expected tiny, base, small or medium)",
                other
            )),
        }
    }
}

/// Static description of a downloadable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhisperModelInfo {
    pub id: WhisperModel,
    pub name: &'static str,
    /// Display size, e.g. "488 MB"
    pub size: &'static str,
    /// Expected size of the complete file
    pub size_bytes: u64,
    pub description: &'static str,
}

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Model catalog, smallest first.
pub static WHISPER_MODELS: [WhisperModelInfo; 4] = [
    WhisperModelInfo {
        id: WhisperModel::Tiny,
        name: "Tiny",
        size: "78 MB",
        size_bytes: 77_704_960,
        description: "Fastest, basic accuracy, good for clear narration",
    },
    WhisperModelInfo {
        id: WhisperModel::Base,
        name: "Base",
        size: "148 MB",
        size_bytes: 147_964_832,
        description: "Fast, solid accuracy for most audiobooks",
    },
    WhisperModelInfo {
        id: WhisperModel::Small,
        name: "Small",
        size: "488 MB",
        size_bytes: 487_636_544,
        description: "Balanced, recommended for best results",
    },
    WhisperModelInfo {
        id: WhisperModel::Medium,
        name: "Medium",
        size: "1.5 GB",
        size_bytes: 1_533_774_848,
        description: "Slow, highest accuracy, multiple speakers",
    },
];

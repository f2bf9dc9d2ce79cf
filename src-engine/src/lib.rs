//! subforge transcription engine
//!
//! Turns one or more audio files into a single SRT subtitle file using ffmpeg
//! for audio handling and whisper.cpp for speech recognition.

pub mod assets;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod process;
pub mod transcription;
pub mod whisper;

pub use assets::{AssetProvider, LocalAssets};
pub use config::EngineConfig;
pub use error::{AssetError, ProcessError, TranscriptionError};
pub use transcription::{Orchestrator, ProgressSink, TranscriptionRequest};
